//! Core type definitions for nnmeta.

use std::fmt;

/// Identifier of one logical transaction of a transaction context.
///
/// Transaction IDs are monotonically increasing per context and only used
/// to correlate log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction ID.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Buffered writes of one entity cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWrites {
    /// Entities added in this transaction.
    pub added: usize,
    /// Entities updated in this transaction.
    pub modified: usize,
    /// Entities removed in this transaction.
    pub removed: usize,
}

impl PendingWrites {
    /// Returns true if nothing is buffered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.modified == 0 && self.removed == 0
    }
}
