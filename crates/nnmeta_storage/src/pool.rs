//! Connection pool over a fixed set of connectors.

use crate::backend::{Session, StorageConnector};
use crate::entity::EntityKind;
use crate::error::{StorageError, StorageResult};
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An explicitly owned pool of storage connectors.
///
/// Each new session is opened on a connector picked at random; the caller
/// keeps that session for as long as it lives. After [`close`](Self::close)
/// no new sessions are handed out, but sessions already open keep working
/// until their owners drop them.
pub struct ConnectorPool {
    connectors: Vec<Arc<dyn StorageConnector>>,
    closed: AtomicBool,
}

impl ConnectorPool {
    /// Creates a pool.
    ///
    /// # Errors
    ///
    /// Returns an error if `connectors` is empty.
    pub fn new(connectors: Vec<Arc<dyn StorageConnector>>) -> StorageResult<Self> {
        if connectors.is_empty() {
            return Err(StorageError::Configuration(
                "connection pool needs at least one connector".into(),
            ));
        }
        Ok(Self {
            connectors,
            closed: AtomicBool::new(false),
        })
    }

    /// Opens a session on a randomly chosen connector.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after `close`, or the connector's
    /// error if the session cannot be opened.
    pub fn obtain_session(&self) -> StorageResult<Box<dyn Session>> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        let idx = rand::thread_rng().gen_range(0..self.connectors.len());
        let connector = &self.connectors[idx];
        tracing::debug!(connector = connector.name(), "opening session");
        connector.open_session()
    }

    /// Deletes every row of the given kinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is closed or the store is unreachable.
    pub fn format(&self, kinds: &[EntityKind]) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        tracing::info!(tables = kinds.len(), "formatting storage");
        self.connectors[0].format(kinds)
    }

    /// Returns the number of connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Always false; a pool holds at least one connector.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Stops handing out sessions.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(connectors = self.connectors.len(), "connection pool closed");
        }
    }

    /// Returns true after `close`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ConnectorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorPool")
            .field("connectors", &self.connectors.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConfig, MemoryDatabase};

    #[test]
    fn empty_pool_rejected() {
        assert!(matches!(
            ConnectorPool::new(Vec::new()),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn sessions_share_one_store() {
        let db = Arc::new(MemoryDatabase::new());
        let pool = db.pool(MemoryConfig::default().connectors(3)).unwrap();
        assert_eq!(pool.len(), 3);

        for _ in 0..10 {
            let session = pool.obtain_session().unwrap();
            assert!(!session.is_active());
        }
        assert_eq!(db.stats().sessions_opened, 10);
    }

    #[test]
    fn closed_pool_refuses_sessions() {
        let db = Arc::new(MemoryDatabase::new());
        let pool = db.pool(MemoryConfig::default()).unwrap();
        let mut open = pool.obtain_session().unwrap();
        pool.close();
        pool.close();

        assert!(pool.is_closed());
        assert!(matches!(pool.obtain_session(), Err(StorageError::Closed)));
        assert!(matches!(pool.format(&EntityKind::ALL), Err(StorageError::Closed)));
        open.begin().unwrap();
        open.rollback().unwrap();
    }
}
