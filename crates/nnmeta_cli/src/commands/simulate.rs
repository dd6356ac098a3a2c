//! Simulate command implementation.

use super::{load_snapshot, save_snapshot, OutputFormat};
use crate::error::CliResult;
use crate::simulation::{Simulation, SimulationConfig, SimulationReport};
use nnmeta_core::Config;
use nnmeta_storage::MemoryDatabase;
use std::path::Path;
use std::sync::Arc;

/// Options of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulateArgs<'a> {
    /// The run itself.
    pub simulation: SimulationConfig,
    /// Snapshot to start from instead of an empty database.
    pub from: Option<&'a Path>,
    /// Where to write the final database.
    pub snapshot: Option<&'a Path>,
}

/// Runs a simulation and returns its report.
pub fn simulate(args: &SimulateArgs<'_>, config: &Config) -> CliResult<SimulationReport> {
    let db = match args.from {
        Some(path) => MemoryDatabase::from_snapshot(&load_snapshot(path)?)?,
        None => MemoryDatabase::new(),
    };
    let mut simulation = Simulation::open(Arc::new(db), config, args.simulation.clone())?;
    let report = simulation.run()?;
    tracing::info!(
        namenodes = report.namenodes,
        rounds = report.rounds.len(),
        leader = ?report.final_leader(),
        "simulation finished"
    );

    if let Some(path) = args.snapshot {
        save_snapshot(path, &simulation.database().snapshot()?)?;
        tracing::info!(path = %path.display(), "snapshot written");
    }
    Ok(report)
}

/// Runs the simulate command.
pub fn run(args: &SimulateArgs<'_>, config: &Config, format: OutputFormat) -> CliResult<()> {
    let report = simulate(args, config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text_output(&report),
    }
    Ok(())
}

fn print_text_output(report: &SimulationReport) {
    println!("Leader Election Simulation");
    println!("==========================");
    println!();
    println!("Namenodes: {}", report.namenodes);
    println!("Delta:     {}", report.delta);
    println!();
    println!("{:>5}  {:>6}  {:<16}  {:<16}  {:>4}", "round", "leader", "active", "ids", "rows");
    for round in &report.rounds {
        println!(
            "{:>5}  {:>6}  {:<16}  {:<16}  {:>4}",
            round.round,
            round.leader,
            join(&round.active),
            join(&round.ids),
            round.rows
        );
    }
    println!();
    match report.first_failover() {
        Some(round) => println!("First failover in round {round}"),
        None => println!("No failover"),
    }
}

fn join(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
