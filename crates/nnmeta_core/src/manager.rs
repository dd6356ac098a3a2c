//! The entity manager: the API business logic calls.

use crate::config::Config;
use crate::context::CachedEntity;
use crate::error::CoreResult;
use crate::transaction::{ContextRegistry, TransactionContext};
use crate::types::{PendingWrites, TransactionId};
use nnmeta_storage::{ConnectorPool, EntityKind, LockMode};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-worker facade over a lazily created [`TransactionContext`].
///
/// Each worker owns its manager; nothing here is shared between threads.
/// Every call is delegated to the transaction context, which is created,
/// together with its backend session, on first use.
///
/// The `*_or_log` variants are the lightweight read path: failures are
/// logged and turned into an empty answer.
#[derive(Debug)]
pub struct EntityManager {
    pool: Arc<ConnectorPool>,
    registry: Arc<ContextRegistry>,
    lock_mode: LockMode,
    context: Option<TransactionContext>,
}

impl EntityManager {
    /// Creates a manager drawing sessions from `pool`.
    pub fn new(pool: Arc<ConnectorPool>, registry: Arc<ContextRegistry>, config: &Config) -> Self {
        Self {
            pool,
            registry,
            lock_mode: config.lock_mode,
            context: None,
        }
    }

    fn context(&mut self) -> &mut TransactionContext {
        let Self {
            pool,
            registry,
            lock_mode,
            context,
        } = self;
        context.get_or_insert_with(|| {
            let mut ctx = TransactionContext::new(Arc::clone(pool), Arc::clone(registry));
            ctx.set_lock_mode(*lock_mode);
            ctx
        })
    }

    /// Begins a transaction. Nested calls enter one more level.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    pub fn begin(&mut self) -> CoreResult<()> {
        self.context().begin()
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotActive` without a running transaction and `CommitFailed`
    /// if storage rejected the writes.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.context().commit()
    }

    /// Rolls back the transaction. Does nothing when idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to roll back.
    pub fn rollback(&mut self) -> CoreResult<()> {
        match self.context.as_mut() {
            Some(ctx) => ctx.rollback(),
            None => Ok(()),
        }
    }

    /// Returns true while a transaction is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.context.as_ref().is_some_and(TransactionContext::is_active)
    }

    /// Returns the id of the running or last transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.context
            .as_ref()
            .map(TransactionContext::transaction_id)
            .unwrap_or_default()
    }

    /// Returns the buffered writes of every dirty cache.
    #[must_use]
    pub fn pending(&self) -> BTreeMap<EntityKind, PendingWrites> {
        self.context
            .as_ref()
            .map(TransactionContext::pending)
            .unwrap_or_default()
    }

    /// Returns the lock mode applied to backend reads.
    #[must_use]
    pub const fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    /// Sets the lock mode for this and later transactions.
    pub fn set_lock_mode(&mut self, mode: LockMode) {
        self.lock_mode = mode;
        if let Some(ctx) = self.context.as_mut() {
            ctx.set_lock_mode(mode);
        }
    }

    /// Finds one entity. A miss is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error on misuse or storage failure.
    pub fn find<T: CachedEntity>(&mut self, finder: &T::Finder) -> CoreResult<Option<Arc<T>>> {
        self.context().find::<T>(finder)
    }

    /// Finds a list of entities.
    ///
    /// # Errors
    ///
    /// Returns an error on misuse or storage failure.
    pub fn find_list<T: CachedEntity>(&mut self, finder: &T::ListFinder) -> CoreResult<Vec<Arc<T>>> {
        self.context().find_list::<T>(finder)
    }

    /// Counts entities.
    ///
    /// # Errors
    ///
    /// Returns an error on misuse or storage failure.
    pub fn count<T: CachedEntity>(&mut self, counter: &T::Counter) -> CoreResult<usize> {
        self.context().count::<T>(counter)
    }

    /// Buffers an insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the key was removed in this transaction.
    pub fn add<T: CachedEntity>(&mut self, entity: T) -> CoreResult<Arc<T>> {
        self.context().add(entity)
    }

    /// Buffers an update.
    ///
    /// # Errors
    ///
    /// Returns an error if the key was removed in this transaction.
    pub fn update<T: CachedEntity>(&mut self, entity: T) -> CoreResult<Arc<T>> {
        self.context().update(entity)
    }

    /// Buffers a delete.
    ///
    /// # Errors
    ///
    /// Returns an error unless the entity is live in this transaction.
    pub fn remove<T: CachedEntity>(&mut self, entity: &T) -> CoreResult<()> {
        self.context().remove(entity)
    }

    /// Deletes every row of `T`, outside the transaction diff.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for kinds without administrative truncation.
    pub fn remove_all<T: CachedEntity>(&mut self) -> CoreResult<()> {
        self.context().remove_all::<T>()
    }

    /// Like [`find`](Self::find), logging failures as a miss.
    pub fn find_or_log<T: CachedEntity>(&mut self, finder: &T::Finder) -> Option<Arc<T>> {
        self.find::<T>(finder).unwrap_or_else(|err| {
            tracing::error!(entity = %T::KIND, ?finder, error = %err, "find failed");
            None
        })
    }

    /// Like [`find_list`](Self::find_list), logging failures as an empty list.
    pub fn find_list_or_log<T: CachedEntity>(&mut self, finder: &T::ListFinder) -> Vec<Arc<T>> {
        self.find_list::<T>(finder).unwrap_or_else(|err| {
            tracing::error!(entity = %T::KIND, ?finder, error = %err, "find_list failed");
            Vec::new()
        })
    }

    /// Like [`count`](Self::count), logging failures as zero.
    pub fn count_or_log<T: CachedEntity>(&mut self, counter: &T::Counter) -> usize {
        self.count::<T>(counter).unwrap_or_else(|err| {
            tracing::error!(entity = %T::KIND, ?counter, error = %err, "count failed");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Count, INodeFinder, INodeListFinder, LeaderFinder, LeaseFinder};
    use crate::error::CoreError;
    use nnmeta_storage::{FaultPoint, INode, Leader, Lease, MemoryConfig, MemoryDatabase};

    fn manager(registry: ContextRegistry) -> (Arc<MemoryDatabase>, EntityManager) {
        let db = Arc::new(MemoryDatabase::new());
        let pool = Arc::new(db.pool(MemoryConfig::default()).unwrap());
        let em = EntityManager::new(pool, Arc::new(registry), &Config::default());
        (db, em)
    }

    #[test]
    fn context_created_on_first_use() {
        let (db, mut em) = manager(ContextRegistry::standard());
        em.rollback().unwrap();
        assert!(!em.is_active());
        assert_eq!(db.stats().sessions_opened, 0);

        em.begin().unwrap();
        assert!(em.is_active());
        assert_eq!(em.transaction_id(), TransactionId::new(1));
        em.commit().unwrap();
        assert_eq!(db.stats().sessions_opened, 1);
    }

    #[test]
    fn read_your_writes_across_finders() {
        let (_db, mut em) = manager(ContextRegistry::standard());
        em.begin().unwrap();
        let root = em.add(INode::directory(1, "", 0)).unwrap();
        let child = em.add(INode::directory(2, "etc", 1)).unwrap();

        let found = em.find::<INode>(&INodeFinder::ById(1)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &root));
        let by_name = em
            .find::<INode>(&INodeFinder::ByNameAndParentId {
                name: "etc".into(),
                parent_id: 1,
            })
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&by_name, &child));
        let listed = em.find_list::<INode>(&INodeListFinder::ByParentId(1)).unwrap();
        assert_eq!(listed.len(), 1);

        em.remove(&*child).unwrap();
        assert!(em.find::<INode>(&INodeFinder::ById(2)).unwrap().is_none());
        assert!(em
            .find_list::<INode>(&INodeListFinder::ByParentId(1))
            .unwrap()
            .is_empty());
        em.commit().unwrap();
    }

    #[test]
    fn lightweight_reads_log_and_swallow() {
        let (db, mut em) = manager(ContextRegistry::new().with::<Leader>());
        assert!(em.find_or_log::<Lease>(&LeaseFinder::ByHolderId(1)).is_none());
        assert_eq!(em.count_or_log::<INode>(&Count::All), 0);

        em.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        db.fail_next(FaultPoint::Read, 1, true);
        assert!(em.find_or_log::<Leader>(&LeaderFinder::ById(1)).is_none());
        assert!(em.find_or_log::<Leader>(&LeaderFinder::ById(1)).is_some());
    }

    #[test]
    fn strict_path_propagates() {
        let (_db, mut em) = manager(ContextRegistry::new().with::<Leader>());
        let err = em.find::<Lease>(&LeaseFinder::ByHolderId(1)).unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntity { .. }));
        assert!(em.commit().is_err());
    }

    #[test]
    fn lock_mode_follows_config_and_overrides() {
        let db = Arc::new(MemoryDatabase::new());
        let pool = Arc::new(db.pool(MemoryConfig::default()).unwrap());
        let config = Config::new().lock_mode(LockMode::Shared);
        let mut em = EntityManager::new(pool, Arc::new(ContextRegistry::standard()), &config);
        assert_eq!(em.lock_mode(), LockMode::Shared);
        em.set_lock_mode(LockMode::Exclusive);
        em.begin().unwrap();
        assert_eq!(em.lock_mode(), LockMode::Exclusive);
        em.rollback().unwrap();
    }
}
