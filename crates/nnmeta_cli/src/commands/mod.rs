//! CLI command implementations.

pub mod inspect;
pub mod leader;
pub mod simulate;

use crate::error::{CliError, CliResult};
use clap::ValueEnum;
use nnmeta_core::{Config, MetadataStore};
use nnmeta_storage::{MemoryConfig, MemoryDatabase, Snapshot};
use std::path::Path;
use std::sync::Arc;

/// How a command prints its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text.
    #[default]
    Text,
    /// Pretty printed JSON.
    Json,
}

/// Loads a configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> CliResult<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let json = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_json::from_str(&json).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON database snapshot.
pub fn load_snapshot(path: &Path) -> CliResult<Snapshot> {
    let json = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    Ok(Snapshot::from_json(&json)?)
}

/// Writes a JSON database snapshot.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> CliResult<()> {
    std::fs::write(path, snapshot.to_json()?).map_err(|e| CliError::io(path, e))
}

/// Opens a metadata store over the rows of `snapshot`.
pub fn open_snapshot(snapshot: &Snapshot, config: Config) -> CliResult<MetadataStore> {
    let db = Arc::new(MemoryDatabase::from_snapshot(snapshot)?);
    let pool = db.pool(MemoryConfig::default())?;
    Ok(MetadataStore::new(pool, config))
}
