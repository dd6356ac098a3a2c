//! Caches for the per-storage replica records.
//!
//! The five replica kinds share one context type. They differ only in which
//! finders and counters they serve and in how block lists are ordered.

use super::{unsupported, CacheCore, CachedEntity, EntityContext, ListIndex};
use crate::error::CoreResult;
use nnmeta_storage::{
    CorruptReplica, ExcessReplica, IndexedReplica, InvalidatedBlock, ReplicaRecord,
    ReplicaUnderConstruction, Session,
};
use std::fmt;
use std::sync::Arc;

/// Single-replica lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaFinder {
    /// By block and storage.
    ByPk {
        /// Block id.
        block_id: i64,
        /// Storage id.
        storage_id: i32,
    },
}

/// Replica list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaListFinder {
    /// The replicas of a block.
    ByBlockId(i64),
    /// The replicas on a storage.
    ByStorageId(i32),
    /// Every replica.
    All,
}

/// Replica counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaCounter {
    /// Every replica.
    All,
    /// The replicas of a block.
    ByBlockId(i64),
}

/// Query support of one replica kind.
pub trait ReplicaQueries: ReplicaRecord + fmt::Debug {
    /// Returns true if the kind serves `finder`.
    fn serves(finder: &ReplicaListFinder) -> bool;

    /// Returns true if the kind serves `counter`.
    fn counts(counter: &ReplicaCounter) -> bool;

    /// Orders the replicas of one block.
    fn order(replicas: &mut [Arc<Self>]) {
        replicas.sort_by_key(|r| r.key());
    }
}

macro_rules! cached_replica {
    (
        $ty:ty,
        lists: $lists:pat
        $(, counters: $counters:pat)?
        $(, order: $order:expr)?
    ) => {
        impl CachedEntity for $ty {
            type Finder = ReplicaFinder;
            type ListFinder = ReplicaListFinder;
            type Counter = ReplicaCounter;
            type Context = ReplicaContext<$ty>;
        }

        impl ReplicaQueries for $ty {
            fn serves(finder: &ReplicaListFinder) -> bool {
                matches!(finder, $lists)
            }

            fn counts(_counter: &ReplicaCounter) -> bool {
                false $(|| matches!(_counter, $counters))?
            }

            $(
                fn order(replicas: &mut [Arc<Self>]) {
                    replicas.sort_by_key($order);
                }
            )?
        }
    };
}

cached_replica!(
    IndexedReplica,
    lists: ReplicaListFinder::ByBlockId(_) | ReplicaListFinder::ByStorageId(_),
    counters: ReplicaCounter::ByBlockId(_),
    order: |r| r.index
);
cached_replica!(
    ReplicaUnderConstruction,
    lists: ReplicaListFinder::ByBlockId(_)
);
cached_replica!(
    InvalidatedBlock,
    lists: ReplicaListFinder::ByBlockId(_) | ReplicaListFinder::ByStorageId(_) | ReplicaListFinder::All,
    counters: ReplicaCounter::All
);
cached_replica!(
    ExcessReplica,
    lists: ReplicaListFinder::ByBlockId(_) | ReplicaListFinder::ByStorageId(_),
    counters: ReplicaCounter::All
);
cached_replica!(
    CorruptReplica,
    lists: ReplicaListFinder::ByBlockId(_) | ReplicaListFinder::All,
    counters: ReplicaCounter::All
);

/// Replicas of one kind by primary key and by block.
#[derive(Debug)]
pub struct ReplicaContext<T: ReplicaRecord> {
    core: CacheCore<T>,
    by_block: ListIndex<T, i64>,
}

impl<T: ReplicaRecord> Default for ReplicaContext<T> {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_block: ListIndex::new(T::block_id),
        }
    }
}

impl<T> EntityContext for ReplicaContext<T>
where
    T: ReplicaQueries + CachedEntity<
            Finder = ReplicaFinder,
            ListFinder = ReplicaListFinder,
            Counter = ReplicaCounter,
        >,
{
    type Entity = T;

    fn core(&self) -> &CacheCore<T> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<T> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &ReplicaFinder,
    ) -> CoreResult<Option<Arc<T>>> {
        match *finder {
            ReplicaFinder::ByPk {
                block_id,
                storage_id,
            } => self.core.find_by_key(session, &(block_id, storage_id)),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &ReplicaListFinder,
    ) -> CoreResult<Vec<Arc<T>>> {
        if !T::serves(finder) {
            return Err(unsupported::<T>(finder));
        }
        match *finder {
            ReplicaListFinder::ByBlockId(block) => {
                let mut replicas = self.block_replicas(session, block)?;
                T::order(&mut replicas);
                Ok(replicas)
            }
            ReplicaListFinder::ByStorageId(storage) => self.core.list_where(
                session,
                |r| r.storage_id() == storage,
                |access| access.find_where(|r| r.storage_id() == storage),
            ),
            ReplicaListFinder::All => self.core.load_all(session),
        }
    }

    fn count(&mut self, session: &mut dyn Session, counter: &ReplicaCounter) -> CoreResult<usize> {
        if !T::counts(counter) {
            return Err(unsupported::<T>(counter));
        }
        match *counter {
            ReplicaCounter::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
            ReplicaCounter::ByBlockId(block) => match self.by_block.get(&self.core, &block) {
                Some(replicas) => Ok(replicas.len()),
                None => self.core.count_where(
                    session,
                    |r| r.block_id() == block,
                    |access| access.count_where(|r| r.block_id() == block),
                ),
            },
        }
    }

    fn index_insert(&mut self, replica: &T, previous: Option<&T>) {
        self.by_block.insert(replica, previous);
    }

    fn index_remove(&mut self, replica: &T) {
        self.by_block.remove(replica);
    }

    fn clear_indices(&mut self) {
        self.by_block.clear();
    }
}

impl<T: ReplicaRecord> ReplicaContext<T> {
    fn block_replicas(&mut self, session: &mut dyn Session, block: i64) -> CoreResult<Vec<Arc<T>>> {
        if let Some(replicas) = self.by_block.get(&self.core, &block) {
            return Ok(replicas);
        }
        let replicas = self.core.list_where(
            session,
            |r| r.block_id() == block,
            |access| access.find_where(|r| r.block_id() == block),
        )?;
        self.by_block.load(block, &replicas);
        Ok(replicas)
    }
}
