//! Inspect command implementation.

use super::{load_snapshot, OutputFormat};
use crate::error::CliResult;
use nnmeta_storage::{Counter, EntityKind, Leader, Snapshot};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Row count of every table, including empty ones.
    pub tables: Vec<TableStats>,
    /// Total rows.
    pub total_rows: usize,
    /// Leader table, by id.
    pub leaders: Vec<Leader>,
    /// Counters table, by id.
    pub counters: Vec<Counter>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: &'static str,
    /// Number of rows.
    pub rows: usize,
}

/// Summarizes a snapshot.
pub fn inspect(path: &Path, snapshot: &Snapshot) -> CliResult<InspectResult> {
    let tables: Vec<TableStats> = EntityKind::ALL
        .into_iter()
        .map(|kind| TableStats {
            table: kind.table_name(),
            rows: snapshot.tables.get(kind.table_name()).map_or(0, Vec::len),
        })
        .collect();

    let mut leaders: Vec<Leader> = snapshot.rows()?;
    leaders.sort_by_key(|row| row.id);
    let mut counters: Vec<Counter> = snapshot.rows()?;
    counters.sort_by_key(|row| row.id);

    Ok(InspectResult {
        path: path.display().to_string(),
        total_rows: tables.iter().map(|t| t.rows).sum(),
        tables,
        leaders,
        counters,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> CliResult<()> {
    let result = inspect(path, &load_snapshot(path)?)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("nnmeta Snapshot Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Tables:");
    for table in result.tables.iter().filter(|t| t.rows > 0) {
        println!("  {:<32} {:>8}", table.table, table.rows);
    }
    println!("  {:<32} {:>8}", "total", result.total_rows);

    if !result.leaders.is_empty() {
        println!();
        println!("Leader rows:");
        for row in &result.leaders {
            println!(
                "  [{}] counter {:>8}  timestamp {:>14}  {}",
                row.id, row.counter, row.timestamp, row.hostname
            );
        }
    }

    if !result.counters.is_empty() {
        println!();
        println!("Counters:");
        for counter in &result.counters {
            println!("  {:<20} {}", counter.name, counter.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnmeta_testkit::{scenarios, TestCluster};

    #[test]
    fn counts_every_table() {
        let cluster = TestCluster::new();
        scenarios::populated_namespace(&cluster, 2, 2);
        cluster.store.format().unwrap();
        scenarios::populated_namespace(&cluster, 1, 3);
        cluster.namenode("nn1:8020").join();

        let file = cluster.snapshot_file();
        let result = inspect(file.path(), &load_snapshot(file.path()).unwrap()).unwrap();

        let rows_of = |name: &str| {
            result
                .tables
                .iter()
                .find(|t| t.table == name)
                .map(|t| t.rows)
                .unwrap()
        };
        assert_eq!(result.tables.len(), EntityKind::ALL.len());
        assert_eq!(rows_of(EntityKind::INode.table_name()), 1 + 1 + 3);
        assert_eq!(rows_of(EntityKind::BlockInfo.table_name()), 3);
        assert_eq!(result.leaders.len(), 1);
        assert_eq!(result.counters.len(), 2);
        assert!(result.counters.iter().all(|c| c.value == 0));
    }
}
