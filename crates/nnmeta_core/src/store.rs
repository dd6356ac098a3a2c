//! The process-wide entry point.

use crate::config::Config;
use crate::counters;
use crate::election::LeaderElection;
use crate::error::CoreResult;
use crate::handler::{LightWeightRequestHandler, OperationKind, TransactionalRequestHandler};
use crate::manager::EntityManager;
use crate::transaction::ContextRegistry;
use nnmeta_storage::{ConnectorPool, EntityKind};
use std::sync::Arc;

/// Owns what every worker shares: the connection pool, the context registry
/// and the configuration.
///
/// Workers never share an [`EntityManager`]; each asks the store for its own.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use nnmeta_core::{Config, LeaderListFinder, MetadataStore, OperationKind};
/// use nnmeta_storage::{Leader, MemoryConfig, MemoryDatabase};
///
/// let db = Arc::new(MemoryDatabase::new());
/// let store = MetadataStore::new(db.pool(MemoryConfig::default()).unwrap(), Config::default());
///
/// let mut em = store.entity_manager();
/// store
///     .transactional(OperationKind::Test)
///     .handle(&mut em, |em| em.add(Leader::new(1, 1, 0, "nn1")).map(drop))
///     .unwrap();
///
/// let rows = em.find_list::<Leader>(&LeaderListFinder::All).unwrap();
/// assert_eq!(rows.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: Arc<ConnectorPool>,
    registry: Arc<ContextRegistry>,
    config: Config,
}

impl MetadataStore {
    /// Creates a store over `pool` caching every metadata kind.
    #[must_use]
    pub fn new(pool: ConnectorPool, config: Config) -> Self {
        Self {
            pool: Arc::new(pool),
            registry: Arc::new(ContextRegistry::standard()),
            config,
        }
    }

    /// Replaces the context registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ContextRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the connection pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectorPool> {
        &self.pool
    }

    /// Returns the context registry.
    #[must_use]
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Creates an entity manager for one worker.
    #[must_use]
    pub fn entity_manager(&self) -> EntityManager {
        EntityManager::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.registry),
            &self.config,
        )
    }

    /// Creates a transactional handler for `op`.
    #[must_use]
    pub fn transactional(&self, op: OperationKind) -> TransactionalRequestHandler<'static> {
        TransactionalRequestHandler::new(op, &self.config)
    }

    /// Creates a lightweight handler for `op`.
    #[must_use]
    pub fn lightweight(&self, op: OperationKind) -> LightWeightRequestHandler {
        LightWeightRequestHandler::new(op, Arc::clone(&self.pool), &self.config)
    }

    /// Creates the election state for this process.
    #[must_use]
    pub fn leader_election(&self) -> LeaderElection {
        LeaderElection::new(&self.config)
    }

    /// Deletes all metadata and resets the counters.
    ///
    /// # Errors
    ///
    /// Returns an error if storage could not be cleared.
    pub fn format(&self) -> CoreResult<()> {
        self.pool.format(&EntityKind::ALL)?;
        let mut em = self.entity_manager();
        self.transactional(OperationKind::FormatCounters)
            .handle(&mut em, counters::reset_counters)
    }

    /// Stops handing out sessions. Managers already created keep theirs.
    pub fn close(&self) {
        self.pool.close();
    }
}
