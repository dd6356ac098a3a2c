//! Leader command implementation.

use super::{load_snapshot, open_snapshot, OutputFormat};
use crate::error::CliResult;
use nnmeta_core::election::election_threshold;
use nnmeta_core::{Config, LeaderConfig, LeaderListFinder, OperationKind};
use nnmeta_storage::Leader;
use serde::Serialize;
use std::path::Path;

/// One row of the Leader table.
#[derive(Debug, Serialize)]
pub struct LeaderRow {
    /// Namenode id.
    pub id: i64,
    /// Heartbeat counter.
    pub counter: i64,
    /// Host name.
    pub hostname: String,
    /// True if the row is above the threshold.
    pub active: bool,
}

/// Leader computed from a snapshot.
#[derive(Debug, Serialize)]
pub struct LeaderResult {
    /// Snapshot path.
    pub path: String,
    /// Missed heartbeat threshold used.
    pub delta: i64,
    /// Counters at or below this value are stale.
    pub threshold: i64,
    /// Leader id, or -1 for an empty table.
    pub leader: i64,
    /// Every row, by id.
    pub rows: Vec<LeaderRow>,
}

/// Computes the leader recorded in the snapshot at `path`.
pub fn determine(path: &Path, config: Config) -> CliResult<LeaderResult> {
    let delta = config.leader.missed_heartbeat_threshold;
    let store = open_snapshot(&load_snapshot(path)?, config)?;
    let observer = store.leader_election();
    let mut em = store.entity_manager();

    let leader = observer.get_leader(&mut em)?;
    let active = observer.active_namenodes(&mut em)?;
    let mut rows = store
        .transactional(OperationKind::SelectAllNamenodes)
        .handle(&mut em, |em| em.find_list::<Leader>(&LeaderListFinder::All))?;
    rows.sort_by_key(|row| row.id);

    let max_counter = rows.iter().map(|row| row.counter).max().unwrap_or(0);
    Ok(LeaderResult {
        path: path.display().to_string(),
        delta,
        threshold: election_threshold(max_counter, rows.len(), delta),
        leader,
        rows: rows
            .iter()
            .map(|row| LeaderRow {
                id: row.id,
                counter: row.counter,
                hostname: row.hostname.clone(),
                active: active.contains_key(&row.id),
            })
            .collect(),
    })
}

/// Runs the leader command.
pub fn run(path: &Path, config: Config, format: OutputFormat) -> CliResult<()> {
    let result = determine(path, config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &LeaderResult) {
    println!("Snapshot:  {}", result.path);
    println!("Delta:     {}", result.delta);
    println!("Threshold: {}", result.threshold);
    if result.leader == nnmeta_core::LEADER_INITIALIZATION_ID {
        println!("Leader:    none (empty table)");
    } else {
        println!("Leader:    {}", result.leader);
    }
    println!();
    for row in &result.rows {
        let marker = match (row.id == result.leader, row.active) {
            (true, _) => "leader",
            (false, true) => "active",
            (false, false) => "stale",
        };
        println!(
            "  [{}] counter {:>8}  {:<24} {}",
            row.id, row.counter, row.hostname, marker
        );
    }
}
