//! Storage backend contract.

use crate::entity::EntityKind;
use crate::error::StorageResult;
use crate::row::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row-locking behaviour requested from the backend for reads.
///
/// The cache layer passes this through untouched; what each mode guarantees
/// is up to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Rows read are locked exclusively until commit.
    Exclusive,
    /// Rows read are share-locked until commit.
    Shared,
    /// Reads see the latest committed data and take no locks.
    #[default]
    ReadCommitted,
}

/// The writes accumulated for one entity kind during a transaction.
///
/// Keys are encoded with [`encode_key`](crate::encode_key).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    /// Keys to delete.
    pub removed: Vec<Vec<u8>>,
    /// Rows to insert.
    pub added: Vec<(Vec<u8>, Row)>,
    /// Rows to overwrite.
    pub modified: Vec<(Vec<u8>, Row)>,
}

impl RowBatch {
    /// Returns true if the batch carries no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.modified.is_empty()
    }

    /// Returns the total number of writes in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.removed.len() + self.added.len() + self.modified.len()
    }
}

/// A single connection to the metadata store.
///
/// A session is owned by exactly one transaction context at a time and is
/// never shared across threads.
///
/// # Invariants
///
/// - Writes are only accepted between `begin` and `commit`/`rollback`
/// - `apply` is atomic with the owning transaction: nothing it writes is
///   visible to other sessions before `commit` succeeds
/// - Within a transaction, reads observe the session's own applied writes
/// - `rollback` without an active transaction is a no-op
pub trait Session: Send + fmt::Debug {
    /// Starts a backend transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already active or the backend
    /// cannot start one.
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the backend transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active or the commit failed. A
    /// failed commit leaves nothing visible.
    fn commit(&mut self) -> StorageResult<()>;

    /// Discards the backend transaction, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to roll back.
    fn rollback(&mut self) -> StorageResult<()>;

    /// Returns true while a backend transaction is active.
    fn is_active(&self) -> bool;

    /// Returns the lock mode used for reads.
    fn lock_mode(&self) -> LockMode;

    /// Sets the lock mode used for subsequent reads.
    fn set_lock_mode(&mut self, mode: LockMode);

    /// Reads one row by encoded primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read failed.
    fn read(&mut self, kind: EntityKind, key: &[u8]) -> StorageResult<Option<Row>>;

    /// Reads every row of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read failed.
    fn scan(&mut self, kind: EntityKind) -> StorageResult<Vec<Row>>;

    /// Applies a batch of writes: deletes first, then inserts, then updates.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active, if an insert hits an
    /// existing key, or if the backend write failed.
    fn apply(&mut self, kind: EntityKind, batch: RowBatch) -> StorageResult<()>;

    /// Deletes every row of a table within the current transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active or the backend failed.
    fn truncate(&mut self, kind: EntityKind) -> StorageResult<()>;
}

/// A factory for sessions against one store endpoint.
pub trait StorageConnector: Send + Sync + fmt::Debug {
    /// Returns the connector's name, for diagnostics.
    fn name(&self) -> &str;

    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn open_session(&self) -> StorageResult<Box<dyn Session>>;

    /// Deletes all rows of the given kinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn format(&self, kinds: &[EntityKind]) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lock_mode_is_read_committed() {
        assert_eq!(LockMode::default(), LockMode::ReadCommitted);
    }

    #[test]
    fn batch_len() {
        let mut batch = RowBatch::default();
        assert!(batch.is_empty());
        batch.removed.push(vec![1]);
        batch.added.push((vec![2], Row::new()));
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
