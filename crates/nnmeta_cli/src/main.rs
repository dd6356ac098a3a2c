//! nnmeta CLI
//!
//! Command-line tools for namenode metadata.
//!
//! # Commands
//!
//! - `simulate` - Run a deterministic multi-namenode leader election
//! - `leader` - Compute the leader recorded in a snapshot
//! - `inspect` - Display per-table row counts of a snapshot
//! - `version` - Show version information

mod commands;
mod error;
mod simulation;

use clap::{Parser, Subcommand};
use commands::simulate::SimulateArgs;
use commands::OutputFormat;
use simulation::{SimulationConfig, Stall};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Namenode metadata tools.
#[derive(Parser)]
#[command(name = "nnmeta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a leader election simulation over an in-memory database
    Simulate {
        /// Namenodes to start
        #[arg(short, long, default_value_t = 3)]
        namenodes: usize,

        /// Heartbeat rounds after the join round
        #[arg(short, long, default_value_t = 10)]
        rounds: usize,

        /// Missed heartbeat threshold (defaults to the configured one)
        #[arg(short, long)]
        delta: Option<i64>,

        /// Stop a namenode's heartbeats: NAMENODE@ROUND or NAMENODE@FROM-UNTIL
        #[arg(long = "stall")]
        stalls: Vec<Stall>,

        /// Start from this snapshot instead of an empty database
        #[arg(long)]
        from: Option<PathBuf>,

        /// Write the final database to this snapshot file
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Compute the leader and active namenodes of a snapshot
    Leader {
        /// Snapshot file
        snapshot: PathBuf,

        /// Missed heartbeat threshold (defaults to the configured one)
        #[arg(short, long)]
        delta: Option<i64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Display snapshot tables and election rows
    Inspect {
        /// Snapshot file
        snapshot: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            namenodes,
            rounds,
            delta,
            stalls,
            from,
            snapshot,
            format,
        } => {
            let args = SimulateArgs {
                simulation: SimulationConfig {
                    namenodes,
                    rounds,
                    delta: delta.unwrap_or(config.leader.missed_heartbeat_threshold),
                    stalls,
                },
                from: from.as_deref(),
                snapshot: snapshot.as_deref(),
            };
            commands::simulate::run(&args, &config, format)?;
        }
        Commands::Leader {
            snapshot,
            delta,
            format,
        } => {
            if let Some(delta) = delta {
                config.leader.missed_heartbeat_threshold = delta;
            }
            commands::leader::run(&snapshot, config, format)?;
        }
        Commands::Inspect { snapshot, format } => {
            commands::inspect::run(&snapshot, format)?;
        }
        Commands::Version => {
            println!("nnmeta CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("nnmeta Core v{}", nnmeta_core::VERSION);
        }
    }

    Ok(())
}
