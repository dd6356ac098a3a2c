//! Replication queue caches.

use super::{CacheCore, CachedEntity, Count, EntityContext};
use crate::error::CoreResult;
use nnmeta_storage::{PendingBlockInfo, Session, UnderReplicatedBlock};
use std::sync::Arc;

/// Lookup of one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFinder {
    /// By block id.
    ByBlockId(i64),
}

/// Under-replicated block list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderReplicatedListFinder {
    /// Every entry, ordered by level.
    All,
    /// The entries at one level.
    ByLevel(i32),
}

/// Under-replicated block counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderReplicatedCounter {
    /// Every entry.
    All,
    /// Entries at one level.
    ByLevel(i32),
    /// Entries below a level.
    LessThanLevel(i32),
}

/// Pending replication list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingBlockListFinder {
    /// Entries scheduled before a time limit.
    ByTimeLimit(i64),
    /// Every entry.
    All,
}

impl CachedEntity for UnderReplicatedBlock {
    type Finder = QueueFinder;
    type ListFinder = UnderReplicatedListFinder;
    type Counter = UnderReplicatedCounter;
    type Context = UnderReplicatedContext;
}

impl CachedEntity for PendingBlockInfo {
    type Finder = QueueFinder;
    type ListFinder = PendingBlockListFinder;
    type Counter = Count;
    type Context = PendingBlockContext;
}

/// The under-replicated blocks queue.
#[derive(Debug, Default)]
pub struct UnderReplicatedContext {
    core: CacheCore<UnderReplicatedBlock>,
}

impl EntityContext for UnderReplicatedContext {
    type Entity = UnderReplicatedBlock;

    fn core(&self) -> &CacheCore<UnderReplicatedBlock> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<UnderReplicatedBlock> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &QueueFinder,
    ) -> CoreResult<Option<Arc<UnderReplicatedBlock>>> {
        match finder {
            QueueFinder::ByBlockId(id) => self.core.find_by_key(session, id),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &UnderReplicatedListFinder,
    ) -> CoreResult<Vec<Arc<UnderReplicatedBlock>>> {
        match *finder {
            UnderReplicatedListFinder::All => {
                let mut all = self.core.load_all(session)?;
                all.sort_by_key(|u| u.level);
                Ok(all)
            }
            UnderReplicatedListFinder::ByLevel(level) => self.core.list_where(
                session,
                |u| u.level == level,
                |access| access.find_by_level(level),
            ),
        }
    }

    fn count(
        &mut self,
        session: &mut dyn Session,
        counter: &UnderReplicatedCounter,
    ) -> CoreResult<usize> {
        match *counter {
            UnderReplicatedCounter::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
            UnderReplicatedCounter::ByLevel(level) => self.core.count_where(
                session,
                |u| u.level == level,
                |access| access.count_by_level(level),
            ),
            UnderReplicatedCounter::LessThanLevel(level) => self.core.count_where(
                session,
                |u| u.level < level,
                |access| access.count_less_than_level(level),
            ),
        }
    }

    fn remove_all(&mut self, session: &mut dyn Session) -> CoreResult<()> {
        self.core.truncate(session)
    }
}

/// In-flight replication bookkeeping.
#[derive(Debug, Default)]
pub struct PendingBlockContext {
    core: CacheCore<PendingBlockInfo>,
}

impl EntityContext for PendingBlockContext {
    type Entity = PendingBlockInfo;

    fn core(&self) -> &CacheCore<PendingBlockInfo> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<PendingBlockInfo> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &QueueFinder,
    ) -> CoreResult<Option<Arc<PendingBlockInfo>>> {
        match finder {
            QueueFinder::ByBlockId(id) => self.core.find_by_key(session, id),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &PendingBlockListFinder,
    ) -> CoreResult<Vec<Arc<PendingBlockInfo>>> {
        match *finder {
            PendingBlockListFinder::ByTimeLimit(limit) => self.core.list_where(
                session,
                |p| p.time_stamp < limit,
                |access| access.find_by_time_limit(limit),
            ),
            PendingBlockListFinder::All => self.core.load_all(session),
        }
    }

    fn count(&mut self, session: &mut dyn Session, counter: &Count) -> CoreResult<usize> {
        match counter {
            Count::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{open, seed};
    use crate::error::CoreError;
    use nnmeta_storage::EntityKind;

    fn queue() -> Vec<UnderReplicatedBlock> {
        vec![
            UnderReplicatedBlock::new(1, 2),
            UnderReplicatedBlock::new(2, 0),
            UnderReplicatedBlock::new(3, 2),
            UnderReplicatedBlock::new(4, 4),
        ]
    }

    #[test]
    fn level_queries() {
        let (_db, mut session) = open();
        seed(session.as_mut(), &queue());
        let mut ctx = UnderReplicatedContext::default();

        let all = ctx
            .find_list(session.as_mut(), &UnderReplicatedListFinder::All)
            .unwrap();
        assert_eq!(all.iter().map(|u| u.level).collect::<Vec<_>>(), vec![0, 2, 2, 4]);
        assert_eq!(
            ctx.count(session.as_mut(), &UnderReplicatedCounter::LessThanLevel(3)).unwrap(),
            3
        );
        ctx.update(UnderReplicatedBlock::new(2, 2)).unwrap();
        assert_eq!(
            ctx.find_list(session.as_mut(), &UnderReplicatedListFinder::ByLevel(2))
                .unwrap()
                .len(),
            3
        );
        assert_eq!(
            ctx.count(session.as_mut(), &UnderReplicatedCounter::ByLevel(0)).unwrap(),
            0
        );
    }

    #[test]
    fn counts_go_to_storage_before_a_scan() {
        let (db, mut session) = open();
        seed(session.as_mut(), &queue());
        let mut ctx = UnderReplicatedContext::default();
        db.reset_stats();
        assert_eq!(
            ctx.count(session.as_mut(), &UnderReplicatedCounter::ByLevel(2)).unwrap(),
            2
        );
        assert_eq!(db.stats().scans, 1);
    }

    #[test]
    fn remove_all_truncates_and_forgets() {
        let (db, mut session) = open();
        seed(session.as_mut(), &queue());
        let mut ctx = UnderReplicatedContext::default();
        ctx.find(session.as_mut(), &QueueFinder::ByBlockId(1)).unwrap();
        ctx.add(UnderReplicatedBlock::new(9, 1)).unwrap();

        ctx.remove_all(session.as_mut()).unwrap();
        assert!(!ctx.core().is_dirty());
        assert!(ctx.find(session.as_mut(), &QueueFinder::ByBlockId(1)).unwrap().is_none());
        session.commit().unwrap();
        assert_eq!(db.row_count(EntityKind::UnderReplicatedBlock), 0);
    }

    #[test]
    fn pending_time_limit_is_exclusive() {
        let (_db, mut session) = open();
        seed(
            session.as_mut(),
            &[PendingBlockInfo::new(1, 100, 1), PendingBlockInfo::new(2, 200, 1)],
        );
        let mut ctx = PendingBlockContext::default();
        let timed_out = ctx
            .find_list(session.as_mut(), &PendingBlockListFinder::ByTimeLimit(200))
            .unwrap();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].block_id, 1);

        assert!(matches!(
            ctx.remove_all(session.as_mut()).unwrap_err(),
            CoreError::Unsupported { .. }
        ));
    }

    #[test]
    fn pending_time_limit_served_from_full_scan() {
        let (db, mut session) = open();
        seed(
            session.as_mut(),
            &[PendingBlockInfo::new(1, 100, 1), PendingBlockInfo::new(2, 200, 1)],
        );
        let mut ctx = PendingBlockContext::default();
        ctx.find_list(session.as_mut(), &PendingBlockListFinder::All).unwrap();
        ctx.update(PendingBlockInfo::new(1, 300, 1)).unwrap();
        db.reset_stats();

        let timed_out = ctx
            .find_list(session.as_mut(), &PendingBlockListFinder::ByTimeLimit(250))
            .unwrap();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].block_id, 2);
        assert_eq!(db.stats().round_trips(), 0);
    }
}
