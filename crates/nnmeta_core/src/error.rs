//! Error types for nnmeta core.

use nnmeta_storage::{EntityKind, StorageError};
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// How a failure must be handled by a request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Programmer or state misuse. Rolled back, never retried.
    Fatal,
    /// A transient storage failure inside the unit of work.
    Retryable,
    /// Flushing or committing the transaction failed.
    BackendFailure,
    /// An application error raised by the unit of work itself.
    Domain,
}

impl ErrorKind {
    /// Returns true if the whole unit of work should run again.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable | Self::BackendFailure)
    }

    /// Returns true if the transaction must be rolled back.
    #[must_use]
    pub const fn requires_rollback(self) -> bool {
        !matches!(self, Self::Domain)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fatal => "fatal",
            Self::Retryable => "retryable",
            Self::BackendFailure => "backend-failure",
            Self::Domain => "domain",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in nnmeta core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage failure outside of commit.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Flushing or committing a transaction failed.
    #[error("commit failed: {source}")]
    CommitFailed {
        /// The backend failure.
        source: StorageError,
    },

    /// No cache is registered for the entity kind.
    #[error("no context registered for entity kind {kind}")]
    UnknownEntity {
        /// The unregistered kind.
        kind: EntityKind,
    },

    /// The operation needs an active transaction.
    #[error("{operation} requires an active transaction")]
    NotActive {
        /// The attempted operation.
        operation: &'static str,
    },

    /// The entity was already removed in this transaction.
    #[error("{kind} {key} was removed in this transaction")]
    RemovedEntity {
        /// Entity kind.
        kind: EntityKind,
        /// Debug form of the key.
        key: String,
    },

    /// The entity is not tracked as live in this transaction.
    #[error("{kind} {key} is not tracked by this transaction")]
    UntrackedEntity {
        /// Entity kind.
        kind: EntityKind,
        /// Debug form of the key.
        key: String,
    },

    /// The entity kind does not support the operation.
    #[error("{kind} does not support {operation}")]
    Unsupported {
        /// Entity kind.
        kind: EntityKind,
        /// The attempted operation.
        operation: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Application error raised by a unit of work.
    #[error("{message}")]
    Domain {
        /// Description of the error.
        message: String,
    },
}

impl CoreError {
    /// Creates a commit failure.
    pub fn commit_failed(source: StorageError) -> Self {
        Self::CommitFailed { source }
    }

    /// Creates a removed-entity error.
    pub fn removed_entity(kind: EntityKind, key: &impl fmt::Debug) -> Self {
        Self::RemovedEntity {
            kind,
            key: format!("{key:?}"),
        }
    }

    /// Creates an untracked-entity error.
    pub fn untracked_entity(kind: EntityKind, key: &impl fmt::Debug) -> Self {
        Self::UntrackedEntity {
            kind,
            key: format!("{key:?}"),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(kind: EntityKind, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            kind,
            operation: operation.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a domain error.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }

    /// Classifies the error for retry handling.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(err) if err.is_transient() => ErrorKind::Retryable,
            Self::CommitFailed { .. } => ErrorKind::BackendFailure,
            Self::Domain { .. } => ErrorKind::Domain,
            _ => ErrorKind::Fatal,
        }
    }

    /// Returns true if the whole unit of work should run again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
