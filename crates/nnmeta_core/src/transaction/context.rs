//! The transaction context: one set of entity caches and one backend session.

use super::registry::ContextRegistry;
use crate::context::{CachedEntity, EntityContext, ErasedContext};
use crate::error::{CoreError, CoreResult};
use crate::types::{PendingWrites, TransactionId};
use nnmeta_storage::{ConnectorPool, EntityKind, LockMode, Session};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No transaction is running.
    #[default]
    Idle,
    /// A transaction is running.
    Active,
}

/// Owns the entity caches of one logical transaction.
///
/// A context is used by one worker at a time. Its backend session is
/// obtained from the pool on the first `begin` and kept for the lifetime of
/// the context.
///
/// `begin` nests: an inner `commit` only closes its own level, while any
/// `rollback` discards the whole transaction. CRUD while idle runs in an
/// implicit transaction that commits on success and rolls back on error.
pub struct TransactionContext {
    pool: Arc<ConnectorPool>,
    registry: Arc<ContextRegistry>,
    session: Option<Box<dyn Session>>,
    contexts: BTreeMap<EntityKind, Box<dyn ErasedContext>>,
    state: TransactionState,
    depth: u32,
    id: TransactionId,
    lock_mode: LockMode,
}

impl TransactionContext {
    /// Creates an idle context.
    pub fn new(pool: Arc<ConnectorPool>, registry: Arc<ContextRegistry>) -> Self {
        Self {
            pool,
            registry,
            session: None,
            contexts: BTreeMap::new(),
            state: TransactionState::Idle,
            depth: 0,
            id: TransactionId::default(),
            lock_mode: LockMode::default(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true while a transaction is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns the nesting depth of `begin` calls.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the id of the running or last transaction.
    #[must_use]
    pub const fn transaction_id(&self) -> TransactionId {
        self.id
    }

    /// Returns the lock mode applied to backend reads.
    #[must_use]
    pub const fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    /// Sets the lock mode, applying it to a running transaction at once.
    pub fn set_lock_mode(&mut self, mode: LockMode) {
        self.lock_mode = mode;
        if let Some(session) = self.session.as_mut() {
            session.set_lock_mode(mode);
        }
    }

    /// Returns the buffered writes of every dirty cache.
    #[must_use]
    pub fn pending(&self) -> BTreeMap<EntityKind, PendingWrites> {
        self.contexts
            .iter()
            .filter(|(_, ctx)| ctx.is_dirty())
            .map(|(kind, ctx)| (*kind, ctx.pending()))
            .collect()
    }

    /// Starts a transaction, or enters one more level of the running one.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the backend cannot
    /// start a transaction.
    pub fn begin(&mut self) -> CoreResult<()> {
        if self.is_active() {
            self.depth += 1;
            tracing::trace!(txn = %self.id, depth = self.depth, "nested begin");
            return Ok(());
        }
        if self.session.is_none() {
            self.session = Some(self.pool.obtain_session()?);
        }
        let session = self
            .session
            .as_deref_mut()
            .ok_or(CoreError::NotActive { operation: "begin" })?;
        session.begin()?;
        session.set_lock_mode(self.lock_mode);
        self.id = self.id.next();
        self.state = TransactionState::Active;
        self.depth = 1;
        tracing::debug!(txn = %self.id, lock_mode = ?self.lock_mode, "transaction started");
        Ok(())
    }

    /// Commits the transaction, or leaves one nested level.
    ///
    /// The outermost commit hands every dirty cache to storage, deletes
    /// first, then commits the session and clears every cache. A failed
    /// flush or commit rolls the transaction back before returning.
    ///
    /// # Errors
    ///
    /// Returns `NotActive` without a running transaction, or `CommitFailed`
    /// if storage rejected the writes.
    pub fn commit(&mut self) -> CoreResult<()> {
        if !self.is_active() {
            return Err(CoreError::NotActive { operation: "commit" });
        }
        if self.depth > 1 {
            self.depth -= 1;
            tracing::trace!(txn = %self.id, depth = self.depth, "nested commit");
            return Ok(());
        }
        let session = self
            .session
            .as_deref_mut()
            .ok_or(CoreError::NotActive { operation: "commit" })?;

        let mut flushed = 0;
        let mut outcome = Ok(());
        for ctx in self.contexts.values().filter(|ctx| ctx.is_dirty()) {
            if let Err(err) = ctx.prepare(session) {
                outcome = Err(err);
                break;
            }
            flushed += 1;
        }
        let outcome = outcome.and_then(|()| session.commit());

        match outcome {
            Ok(()) => {
                tracing::debug!(txn = %self.id, kinds = flushed, "transaction committed");
                self.finish();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(txn = %self.id, error = %err, "commit failed, rolling back");
                if let Err(rollback) = session.rollback() {
                    tracing::warn!(txn = %self.id, error = %rollback, "rollback after failed commit");
                }
                self.finish();
                Err(CoreError::commit_failed(err))
            }
        }
    }

    /// Discards the transaction at any depth.
    ///
    /// Does nothing when idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend failed to roll back. The caches are
    /// cleared and the context is idle either way.
    pub fn rollback(&mut self) -> CoreResult<()> {
        if !self.is_active() {
            return Ok(());
        }
        let result = match self.session.as_deref_mut() {
            Some(session) => session.rollback(),
            None => Ok(()),
        };
        tracing::debug!(txn = %self.id, "transaction rolled back");
        self.finish();
        result.map_err(CoreError::from)
    }

    fn finish(&mut self) {
        for ctx in self.contexts.values_mut() {
            ctx.clear();
        }
        self.state = TransactionState::Idle;
        self.depth = 0;
    }

    /// Finds one entity.
    ///
    /// # Errors
    ///
    /// Returns an error for an unregistered kind, an unsupported finder or a
    /// storage failure.
    pub fn find<T: CachedEntity>(&mut self, finder: &T::Finder) -> CoreResult<Option<Arc<T>>> {
        self.with_context::<T, _>("find", |ctx, session| ctx.find(session, finder))
    }

    /// Finds a list of entities.
    ///
    /// # Errors
    ///
    /// Returns an error for an unregistered kind, an unsupported finder or a
    /// storage failure.
    pub fn find_list<T: CachedEntity>(&mut self, finder: &T::ListFinder) -> CoreResult<Vec<Arc<T>>> {
        self.with_context::<T, _>("find_list", |ctx, session| ctx.find_list(session, finder))
    }

    /// Counts entities.
    ///
    /// # Errors
    ///
    /// Returns an error for an unregistered kind, an unsupported counter or a
    /// storage failure.
    pub fn count<T: CachedEntity>(&mut self, counter: &T::Counter) -> CoreResult<usize> {
        self.with_context::<T, _>("count", |ctx, session| ctx.count(session, counter))
    }

    /// Buffers an insert and returns the cached instance.
    ///
    /// # Errors
    ///
    /// Returns `RemovedEntity` if the key was removed in this transaction.
    pub fn add<T: CachedEntity>(&mut self, entity: T) -> CoreResult<Arc<T>> {
        self.with_context::<T, _>("add", |ctx, _| ctx.add(entity))
    }

    /// Buffers an update and returns the cached instance.
    ///
    /// # Errors
    ///
    /// Returns `RemovedEntity` if the key was removed in this transaction.
    pub fn update<T: CachedEntity>(&mut self, entity: T) -> CoreResult<Arc<T>> {
        self.with_context::<T, _>("update", |ctx, _| ctx.update(entity))
    }

    /// Buffers a delete.
    ///
    /// # Errors
    ///
    /// Returns `UntrackedEntity` unless the entity is live in this
    /// transaction.
    pub fn remove<T: CachedEntity>(&mut self, entity: &T) -> CoreResult<()> {
        self.with_context::<T, _>("remove", |ctx, _| ctx.remove(entity))
    }

    /// Deletes every row of `T` inside the running backend transaction.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for kinds without administrative truncation.
    pub fn remove_all<T: CachedEntity>(&mut self) -> CoreResult<()> {
        self.with_context::<T, _>("remove_all", |ctx, session| {
            tracing::warn!(entity = %T::KIND, "removing every row");
            ctx.remove_all(session)
        })
    }

    fn with_context<T, R>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut T::Context, &mut dyn Session) -> CoreResult<R>,
    ) -> CoreResult<R>
    where
        T: CachedEntity,
    {
        if !self.registry.contains(T::KIND) {
            return Err(CoreError::UnknownEntity { kind: T::KIND });
        }
        if self.is_active() {
            return self.route::<T, R>(operation, f);
        }

        self.begin()?;
        tracing::trace!(txn = %self.id, operation, entity = %T::KIND, "implicit transaction");
        match self.route::<T, R>(operation, f) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback() {
                    tracing::warn!(error = %rollback, "implicit rollback failed");
                }
                Err(err)
            }
        }
    }

    fn route<T, R>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut T::Context, &mut dyn Session) -> CoreResult<R>,
    ) -> CoreResult<R>
    where
        T: CachedEntity,
    {
        let session = self
            .session
            .as_deref_mut()
            .ok_or(CoreError::NotActive { operation })?;
        let erased = match self.contexts.entry(T::KIND) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.registry.create(T::KIND)?),
        };
        let ctx = erased
            .as_any_mut()
            .downcast_mut::<T::Context>()
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("{} is registered with a foreign cache", T::KIND))
            })?;
        f(ctx, session)
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::warn!(txn = %self.id, "dropping an active transaction");
            let _ = self.rollback();
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("depth", &self.depth)
            .field("lock_mode", &self.lock_mode)
            .field("cached_kinds", &self.contexts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{INodeFinder, LeaderFinder, QueueFinder};
    use crate::error::ErrorKind;
    use nnmeta_storage::{
        FaultPoint, INode, Leader, MemoryConfig, MemoryDatabase, UnderReplicatedBlock,
    };

    fn context() -> (Arc<MemoryDatabase>, TransactionContext) {
        let db = Arc::new(MemoryDatabase::new());
        let pool = Arc::new(db.pool(MemoryConfig::default()).unwrap());
        let ctx = TransactionContext::new(pool, Arc::new(ContextRegistry::standard()));
        (db, ctx)
    }

    #[test]
    fn commit_requires_active() {
        let (_db, mut ctx) = context();
        let err = ctx.commit().unwrap_err();
        assert!(matches!(err, CoreError::NotActive { .. }));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn rollback_is_idempotent() {
        let (db, mut ctx) = context();
        ctx.rollback().unwrap();
        ctx.rollback().unwrap();
        assert_eq!(db.stats().sessions_opened, 0);

        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        ctx.rollback().unwrap();
        let after_first = db.stats();
        ctx.rollback().unwrap();
        assert_eq!(db.stats(), after_first);
        assert_eq!(ctx.state(), TransactionState::Idle);
        assert_eq!(db.row_count(EntityKind::Leader), 0);
    }

    #[test]
    fn commit_flushes_each_dirty_kind_once() {
        let (db, mut ctx) = context();
        ctx.begin().unwrap();
        ctx.add(INode::directory(1, "", 0)).unwrap();
        ctx.add(INode::directory(2, "a", 1)).unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        ctx.find::<UnderReplicatedBlock>(&QueueFinder::ByBlockId(9)).unwrap();
        assert_eq!(ctx.pending().len(), 2);
        ctx.commit().unwrap();

        let stats = db.stats();
        assert_eq!(stats.batches_for(EntityKind::INode), 1);
        assert_eq!(stats.batches_for(EntityKind::Leader), 1);
        assert_eq!(stats.batches_for(EntityKind::UnderReplicatedBlock), 0);
        assert_eq!(db.row_count(EntityKind::INode), 2);
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn caches_are_fresh_after_commit() {
        let (_db, mut ctx) = context();
        ctx.begin().unwrap();
        let first = ctx.add(Leader::new(1, 5, 0, "nn1")).unwrap();
        ctx.commit().unwrap();

        ctx.begin().unwrap();
        let again = ctx.find::<Leader>(&LeaderFinder::ById(1)).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
        ctx.commit().unwrap();
    }

    #[test]
    fn nested_begin_commits_once() {
        let (db, mut ctx) = context();
        ctx.begin().unwrap();
        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        ctx.commit().unwrap();
        assert!(ctx.is_active());
        assert_eq!(db.row_count(EntityKind::Leader), 0);
        ctx.commit().unwrap();
        assert!(!ctx.is_active());
        assert_eq!(db.row_count(EntityKind::Leader), 1);
    }

    #[test]
    fn nested_rollback_discards_everything() {
        let (db, mut ctx) = context();
        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        ctx.begin().unwrap();
        ctx.rollback().unwrap();
        assert!(!ctx.is_active());
        assert!(ctx.commit().is_err());
        assert_eq!(db.row_count(EntityKind::Leader), 0);
    }

    #[test]
    fn implicit_transactions() {
        let (db, mut ctx) = context();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        assert!(!ctx.is_active());
        assert_eq!(db.row_count(EntityKind::Leader), 1);

        let err = ctx.remove(&Leader::new(7, 0, 0, "nn7")).unwrap_err();
        assert!(matches!(err, CoreError::UntrackedEntity { .. }));
        assert!(!ctx.is_active());
        assert_eq!(db.stats().rollbacks, 1);
    }

    #[test]
    fn inner_calls_never_commit_an_outer_transaction() {
        let (db, mut ctx) = context();
        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        ctx.find::<Leader>(&LeaderFinder::ById(1)).unwrap();
        assert!(ctx.is_active());
        assert_eq!(db.stats().commits, 0);
        ctx.commit().unwrap();
    }

    #[test]
    fn unknown_kind_is_fatal() {
        let db = Arc::new(MemoryDatabase::new());
        let pool = Arc::new(db.pool(MemoryConfig::default()).unwrap());
        let registry = ContextRegistry::new().with::<Leader>();
        let mut ctx = TransactionContext::new(pool, Arc::new(registry));

        let err = ctx.find::<INode>(&INodeFinder::ById(1)).unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntity { .. }));
        assert_eq!(db.stats().sessions_opened, 0);
    }

    #[test]
    fn failed_commit_rolls_back_and_classifies() {
        let (db, mut ctx) = context();
        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        db.fail_next(FaultPoint::Commit, 1, true);

        let err = ctx.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendFailure);
        assert!(!ctx.is_active());
        assert!(ctx.pending().is_empty());
        assert_eq!(db.row_count(EntityKind::Leader), 0);

        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        ctx.commit().unwrap();
        assert_eq!(db.row_count(EntityKind::Leader), 1);
    }

    #[test]
    fn duplicate_insert_fails_at_commit() {
        let (_db, mut ctx) = context();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();

        ctx.begin().unwrap();
        ctx.add(Leader::new(1, 0, 0, "nn1")).unwrap();
        let err = ctx.commit().unwrap_err();
        assert!(matches!(err, CoreError::CommitFailed { .. }));
    }

    #[test]
    fn remove_all_is_administrative() {
        let (db, mut ctx) = context();
        ctx.add(UnderReplicatedBlock::new(1, 0)).unwrap();
        ctx.remove_all::<UnderReplicatedBlock>().unwrap();
        assert_eq!(db.row_count(EntityKind::UnderReplicatedBlock), 0);

        let err = ctx.remove_all::<Leader>().unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }

    #[test]
    fn lock_mode_reaches_the_session() {
        let (_db, mut ctx) = context();
        ctx.set_lock_mode(LockMode::Exclusive);
        ctx.begin().unwrap();
        assert_eq!(ctx.lock_mode(), LockMode::Exclusive);
        assert_eq!(
            ctx.session.as_ref().map(|s| s.lock_mode()),
            Some(LockMode::Exclusive)
        );
        ctx.rollback().unwrap();
    }
}
