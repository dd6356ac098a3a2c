//! Per-entity transaction caches.
//!
//! Every entity kind has one context type implementing [`EntityContext`].
//! A context wraps the storage finders of its kind with a read-through,
//! write-back [`CacheCore`] plus whatever secondary indices its finders need.
//! Finders, list finders and counters are typed per entity through
//! [`CachedEntity`], so a query can only name a finder its kind declares.

mod block;
mod block_key;
pub mod cache;
mod inode;
mod leader;
mod lease;
mod queue;
mod replica;

pub use block::{BlockContext, BlockFinder, BlockListFinder};
pub use block_key::{BlockKeyContext, BlockKeyFinder, BlockKeyListFinder};
pub use cache::{CacheCore, Cached, ListIndex, UniqueIndex};
pub use inode::{INodeContext, INodeFinder, INodeListFinder};
pub use leader::{
    CounterContext, CounterFinder, CounterListFinder, LeaderContext, LeaderCounter, LeaderFinder,
    LeaderListFinder,
};
pub use lease::{
    LeaseContext, LeaseFinder, LeaseListFinder, LeasePathContext, LeasePathFinder,
    LeasePathListFinder,
};
pub use queue::{
    PendingBlockContext, PendingBlockListFinder, QueueFinder, UnderReplicatedContext,
    UnderReplicatedCounter, UnderReplicatedListFinder,
};
pub use replica::{ReplicaContext, ReplicaCounter, ReplicaFinder, ReplicaListFinder, ReplicaQueries};

use crate::error::{CoreError, CoreResult};
use crate::types::PendingWrites;
use nnmeta_storage::{EntityKind, Persistable, Session, StorageResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Counter for kinds whose only count is the whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    /// Every row.
    All,
}

/// An entity kind that has a transaction cache.
pub trait CachedEntity: Persistable {
    /// Finders returning at most one entity.
    type Finder: fmt::Debug;
    /// Finders returning a list.
    type ListFinder: fmt::Debug;
    /// Count queries.
    type Counter: fmt::Debug;
    /// The cache of this kind.
    type Context: EntityContext<Entity = Self> + Default;
}

/// The transaction cache of one entity kind.
///
/// Implementations provide the finders and keep their secondary indices in
/// step through the `index_*` hooks; the write operations are shared.
pub trait EntityContext: Send + 'static {
    /// The cached entity.
    type Entity: CachedEntity;

    /// Returns the primary cache.
    fn core(&self) -> &CacheCore<Self::Entity>;

    /// Returns the primary cache mutably.
    fn core_mut(&mut self) -> &mut CacheCore<Self::Entity>;

    /// Finds one entity.
    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &<Self::Entity as CachedEntity>::Finder,
    ) -> CoreResult<Option<Arc<Self::Entity>>>;

    /// Finds a list of entities.
    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &<Self::Entity as CachedEntity>::ListFinder,
    ) -> CoreResult<Vec<Arc<Self::Entity>>>;

    /// Counts entities.
    fn count(
        &mut self,
        _session: &mut dyn Session,
        counter: &<Self::Entity as CachedEntity>::Counter,
    ) -> CoreResult<usize> {
        Err(unsupported::<Self::Entity>(counter))
    }

    /// Tracks an added or updated entity in the secondary indices.
    fn index_insert(&mut self, _entity: &Self::Entity, _previous: Option<&Self::Entity>) {}

    /// Drops a removed entity from the secondary indices.
    fn index_remove(&mut self, _entity: &Self::Entity) {}

    /// Empties the secondary indices.
    fn clear_indices(&mut self) {}

    /// Buffers an insert.
    fn add(&mut self, entity: Self::Entity) -> CoreResult<Arc<Self::Entity>> {
        let (entity, previous) = self.core_mut().add(entity)?;
        self.index_insert(&entity, previous.as_deref());
        Ok(entity)
    }

    /// Buffers an update.
    fn update(&mut self, entity: Self::Entity) -> CoreResult<Arc<Self::Entity>> {
        let (entity, previous) = self.core_mut().update(entity)?;
        self.index_insert(&entity, previous.as_deref());
        Ok(entity)
    }

    /// Buffers a delete.
    fn remove(&mut self, entity: &Self::Entity) -> CoreResult<()> {
        let live = self.core_mut().remove(entity)?;
        self.index_remove(&live);
        Ok(())
    }

    /// Deletes every row of the kind, bypassing the transaction diff.
    fn remove_all(&mut self, _session: &mut dyn Session) -> CoreResult<()> {
        Err(CoreError::unsupported(Self::Entity::KIND, "remove_all"))
    }

    /// Hands the buffered writes to storage.
    fn prepare(&self, session: &mut dyn Session) -> StorageResult<()> {
        self.core().prepare(session)
    }

    /// Empties every index and dirty set.
    fn clear(&mut self) {
        self.core_mut().clear();
        self.clear_indices();
    }
}

/// Object-safe view of an [`EntityContext`], used by the transaction
/// context to commit and clear caches without knowing their types.
pub trait ErasedContext: Send {
    /// Kind of the cached entity.
    fn kind(&self) -> EntityKind;

    /// Returns true if writes are buffered.
    fn is_dirty(&self) -> bool;

    /// Returns the sizes of the dirty sets.
    fn pending(&self) -> PendingWrites;

    /// Hands the buffered writes to storage.
    fn prepare(&self, session: &mut dyn Session) -> StorageResult<()>;

    /// Empties every index and dirty set.
    fn clear(&mut self);

    /// Returns self for downcasting to the concrete context.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: EntityContext> ErasedContext for C {
    fn kind(&self) -> EntityKind {
        C::Entity::KIND
    }

    fn is_dirty(&self) -> bool {
        self.core().is_dirty()
    }

    fn pending(&self) -> PendingWrites {
        self.core().pending()
    }

    fn prepare(&self, session: &mut dyn Session) -> StorageResult<()> {
        EntityContext::prepare(self, session)
    }

    fn clear(&mut self) {
        EntityContext::clear(self);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Error for a finder or counter the kind does not serve.
pub(crate) fn unsupported<T: Persistable>(query: &impl fmt::Debug) -> CoreError {
    CoreError::unsupported(T::KIND, format!("{query:?}"))
}

#[cfg(test)]
pub(crate) mod testing {
    use nnmeta_storage::{DataAccess, MemoryDatabase, Persistable, Session, StorageConnector};
    use std::sync::Arc;

    /// Opens an active session on a fresh database.
    pub fn open() -> (Arc<MemoryDatabase>, Box<dyn Session>) {
        let db = Arc::new(MemoryDatabase::new());
        let mut session = db.connector("test").open_session().unwrap();
        session.begin().unwrap();
        (db, session)
    }

    /// Commits `rows` and starts a new transaction.
    pub fn seed<T: Persistable>(session: &mut dyn Session, rows: &[T]) {
        DataAccess::<T>::new(session).prepare([], rows, []).unwrap();
        session.commit().unwrap();
        session.begin().unwrap();
    }
}
