//! Error types for storage operations.

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A concurrent transaction touched the same rows first.
    #[error("conflict on {kind}: {message}")]
    Conflict {
        /// Entity kind whose rows conflicted.
        kind: EntityKind,
        /// Description of the conflict.
        message: String,
    },

    /// The backend could not serve the request right now.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// An insert hit an existing primary key.
    #[error("duplicate key in {kind}")]
    DuplicateKey {
        /// Entity kind of the table.
        kind: EntityKind,
    },

    /// A write was issued outside of a backend transaction.
    #[error("no active transaction")]
    NoTransaction,

    /// `begin` was called on a session that already has a transaction.
    #[error("transaction already active")]
    TransactionActive,

    /// A row is missing a column its entity needs.
    #[error("missing column `{column}`")]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A column holds a value of the wrong type.
    #[error("column `{column}` is not {expected}")]
    ColumnType {
        /// Column name.
        column: String,
        /// Expected type name.
        expected: &'static str,
    },

    /// A column holds a value outside of its domain.
    #[error("column `{column}` has invalid value {value}")]
    InvalidValue {
        /// Column name.
        column: String,
        /// The offending value.
        value: i64,
    },

    /// Row or key encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Snapshot import/export failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Non-recoverable backend failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Invalid backend or pool configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The connection pool is closed.
    #[error("connection pool is closed")]
    Closed,
}

impl StorageError {
    /// Creates a conflict error.
    pub fn conflict(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a missing column error.
    pub fn missing_column(column: &str) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
        }
    }

    /// Creates a column type error.
    pub fn column_type(column: &str, expected: &'static str) -> Self {
        Self::ColumnType {
            column: column.to_string(),
            expected,
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(column: &str, value: i64) -> Self {
        Self::InvalidValue {
            column: column.to_string(),
            value,
        }
    }

    /// Returns true if the failure is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StorageError::conflict(EntityKind::Leader, "row changed").is_transient());
        assert!(StorageError::unavailable("timeout").is_transient());
        assert!(!StorageError::DuplicateKey {
            kind: EntityKind::INode
        }
        .is_transient());
        assert!(!StorageError::Closed.is_transient());
        assert!(!StorageError::missing_column("id").is_transient());
    }

    #[test]
    fn error_messages() {
        let err = StorageError::column_type("counter", "an integer");
        assert_eq!(err.to_string(), "column `counter` is not an integer");

        let err = StorageError::DuplicateKey {
            kind: EntityKind::Leader,
        };
        assert_eq!(err.to_string(), "duplicate key in Leader");
    }
}
