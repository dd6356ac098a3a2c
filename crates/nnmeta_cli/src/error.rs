//! CLI error type.

use nnmeta_core::CoreError;
use nnmeta_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file did not parse.
    #[error("invalid config {}: {source}", path.display())]
    Config {
        /// The config file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot could not be decoded or loaded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] StorageError),

    /// A metadata operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Output could not be encoded.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
