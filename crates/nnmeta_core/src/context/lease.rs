//! Lease caches.

use super::{CacheCore, CachedEntity, Count, EntityContext, ListIndex, UniqueIndex};
use crate::error::CoreResult;
use nnmeta_storage::{Lease, LeasePath, Session};
use std::sync::Arc;

/// Single-lease lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseFinder {
    /// By holder (client) name.
    ByHolder(String),
    /// By numeric holder id.
    ByHolderId(i32),
}

/// Lease list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseListFinder {
    /// Leases last renewed before a time limit.
    ByTimeLimit(i64),
    /// Every lease.
    All,
}

/// Single-path lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeasePathFinder {
    /// By path.
    ByPath(String),
}

/// Lease path list lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeasePathListFinder {
    /// The paths held by one lease.
    ByHolderId(i32),
    /// Paths under a prefix.
    ByPrefix(String),
    /// Every path.
    All,
}

impl CachedEntity for Lease {
    type Finder = LeaseFinder;
    type ListFinder = LeaseListFinder;
    type Counter = Count;
    type Context = LeaseContext;
}

impl CachedEntity for LeasePath {
    type Finder = LeasePathFinder;
    type ListFinder = LeasePathListFinder;
    type Counter = Count;
    type Context = LeasePathContext;
}

fn lease_holder_id(lease: &Lease) -> Option<i32> {
    Some(lease.holder_id)
}

fn path_holder_id(path: &LeasePath) -> i32 {
    path.holder_id
}

/// Leases by holder and holder id.
#[derive(Debug)]
pub struct LeaseContext {
    core: CacheCore<Lease>,
    by_holder_id: UniqueIndex<Lease, i32>,
}

impl Default for LeaseContext {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_holder_id: UniqueIndex::new(lease_holder_id),
        }
    }
}

impl EntityContext for LeaseContext {
    type Entity = Lease;

    fn core(&self) -> &CacheCore<Lease> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<Lease> {
        &mut self.core
    }

    fn find(&mut self, session: &mut dyn Session, finder: &LeaseFinder) -> CoreResult<Option<Arc<Lease>>> {
        match finder {
            LeaseFinder::ByHolder(holder) => self.core.find_by_key(session, holder),
            LeaseFinder::ByHolderId(holder_id) => {
                let holder_id = *holder_id;
                self.by_holder_id.find(&mut self.core, session, &holder_id, |access| {
                    access.find_by_holder_id(holder_id)
                })
            }
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &LeaseListFinder,
    ) -> CoreResult<Vec<Arc<Lease>>> {
        match *finder {
            LeaseListFinder::ByTimeLimit(limit) => self.core.list_where(
                session,
                |l| l.last_update < limit,
                |access| access.find_by_time_limit(limit),
            ),
            LeaseListFinder::All => self.core.load_all(session),
        }
    }

    fn count(&mut self, session: &mut dyn Session, counter: &Count) -> CoreResult<usize> {
        match counter {
            Count::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
        }
    }

    fn index_insert(&mut self, lease: &Lease, previous: Option<&Lease>) {
        self.by_holder_id.insert(lease, previous);
    }

    fn index_remove(&mut self, lease: &Lease) {
        self.by_holder_id.remove(lease);
    }

    fn clear_indices(&mut self) {
        self.by_holder_id.clear();
    }
}

/// Lease paths by path and by holder.
#[derive(Debug)]
pub struct LeasePathContext {
    core: CacheCore<LeasePath>,
    by_holder: ListIndex<LeasePath, i32>,
}

impl Default for LeasePathContext {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_holder: ListIndex::new(path_holder_id),
        }
    }
}

impl EntityContext for LeasePathContext {
    type Entity = LeasePath;

    fn core(&self) -> &CacheCore<LeasePath> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<LeasePath> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &LeasePathFinder,
    ) -> CoreResult<Option<Arc<LeasePath>>> {
        match finder {
            LeasePathFinder::ByPath(path) => self.core.find_by_key(session, path),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &LeasePathListFinder,
    ) -> CoreResult<Vec<Arc<LeasePath>>> {
        match finder {
            LeasePathListFinder::ByHolderId(holder_id) => {
                let holder_id = *holder_id;
                if let Some(paths) = self.by_holder.get(&self.core, &holder_id) {
                    return Ok(paths);
                }
                let paths = self.core.list_where(
                    session,
                    |p| p.holder_id == holder_id,
                    |access| access.find_by_holder_id(holder_id),
                )?;
                self.by_holder.load(holder_id, &paths);
                Ok(paths)
            }
            LeasePathListFinder::ByPrefix(prefix) => self.core.list_where(
                session,
                |p| p.path.starts_with(prefix.as_str()),
                |access| access.find_by_prefix(prefix),
            ),
            LeasePathListFinder::All => self.core.load_all(session),
        }
    }

    fn count(&mut self, session: &mut dyn Session, counter: &Count) -> CoreResult<usize> {
        match counter {
            Count::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
        }
    }

    fn index_insert(&mut self, path: &LeasePath, previous: Option<&LeasePath>) {
        self.by_holder.insert(path, previous);
    }

    fn index_remove(&mut self, path: &LeasePath) {
        self.by_holder.remove(path);
    }

    fn clear_indices(&mut self) {
        self.by_holder.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{open, seed};

    #[test]
    fn holder_id_and_holder_resolve_to_same_lease() {
        let (db, mut session) = open();
        seed(
            session.as_mut(),
            &[Lease::new("client-a", 1, 100), Lease::new("client-b", 2, 300)],
        );
        let mut ctx = LeaseContext::default();

        let by_id = ctx
            .find(session.as_mut(), &LeaseFinder::ByHolderId(2))
            .unwrap()
            .unwrap();
        db.reset_stats();
        let by_holder = ctx
            .find(session.as_mut(), &LeaseFinder::ByHolder("client-b".into()))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_holder));
        assert_eq!(db.stats().round_trips(), 0);

        assert!(ctx
            .find(session.as_mut(), &LeaseFinder::ByHolderId(7))
            .unwrap()
            .is_none());
    }

    #[test]
    fn renewed_lease_leaves_expiry_list() {
        let (_db, mut session) = open();
        seed(
            session.as_mut(),
            &[Lease::new("client-a", 1, 100), Lease::new("client-b", 2, 300)],
        );
        let mut ctx = LeaseContext::default();
        ctx.update(Lease::new("client-a", 1, 500)).unwrap();

        let expired = ctx
            .find_list(session.as_mut(), &LeaseListFinder::ByTimeLimit(400))
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].holder, "client-b");
    }

    #[test]
    fn expiry_list_served_from_full_scan() {
        let (db, mut session) = open();
        seed(
            session.as_mut(),
            &[Lease::new("client-a", 1, 100), Lease::new("client-b", 2, 300)],
        );
        let mut ctx = LeaseContext::default();
        ctx.find_list(session.as_mut(), &LeaseListFinder::All).unwrap();
        ctx.add(Lease::new("client-c", 3, 50)).unwrap();
        db.reset_stats();

        let expired = ctx
            .find_list(session.as_mut(), &LeaseListFinder::ByTimeLimit(200))
            .unwrap();
        let holders: Vec<_> = expired.iter().map(|l| l.holder.as_str()).collect();
        assert_eq!(holders, vec!["client-a", "client-c"]);
        assert_eq!(db.stats().round_trips(), 0);
    }

    #[test]
    fn holder_id_index_follows_reassignment() {
        let (_db, mut session) = open();
        seed(session.as_mut(), &[Lease::new("client-a", 1, 100)]);
        let mut ctx = LeaseContext::default();
        ctx.find(session.as_mut(), &LeaseFinder::ByHolderId(1)).unwrap();

        let moved = ctx.update(Lease::new("client-a", 5, 100)).unwrap();
        let found = ctx
            .find(session.as_mut(), &LeaseFinder::ByHolderId(5))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&found, &moved));
        assert!(ctx
            .find(session.as_mut(), &LeaseFinder::ByHolderId(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn paths_follow_their_holder() {
        let (db, mut session) = open();
        seed(
            session.as_mut(),
            &[
                LeasePath::new("/a/1", 1),
                LeasePath::new("/a/2", 1),
                LeasePath::new("/b/1", 2),
            ],
        );
        let mut ctx = LeasePathContext::default();
        let held = ctx
            .find_list(session.as_mut(), &LeasePathListFinder::ByHolderId(1))
            .unwrap();
        assert_eq!(held.len(), 2);
        ctx.find_list(session.as_mut(), &LeasePathListFinder::ByHolderId(2))
            .unwrap();

        ctx.update(LeasePath::new("/a/2", 2)).unwrap();
        ctx.remove(&held[0]).unwrap();
        ctx.add(LeasePath::new("/c", 1)).unwrap();
        db.reset_stats();

        let one: Vec<_> = ctx
            .find_list(session.as_mut(), &LeasePathListFinder::ByHolderId(1))
            .unwrap()
            .iter()
            .map(|p| p.path.clone())
            .collect();
        let two = ctx
            .find_list(session.as_mut(), &LeasePathListFinder::ByHolderId(2))
            .unwrap();
        assert_eq!(one, vec!["/c".to_string()]);
        assert_eq!(two.len(), 2);
        assert_eq!(db.stats().round_trips(), 0);

        let under_a = ctx
            .find_list(session.as_mut(), &LeasePathListFinder::ByPrefix("/a".into()))
            .unwrap();
        assert_eq!(under_a.len(), 1);
        assert_eq!(under_a[0].holder_id, 2);
    }
}
