//! Transaction-scoped entity cache machinery.
//!
//! [`CacheCore`] holds the primary-key index and the dirty sets of one
//! entity kind. Secondary indices live next to it in each entity context:
//! [`UniqueIndex`] for alternate unique keys and [`ListIndex`] for
//! foreign-key lists. Both store primary keys only and resolve through the
//! core, so every lookup path returns the same instance.

use crate::error::{CoreError, CoreResult};
use crate::types::PendingWrites;
use nnmeta_storage::{DataAccess, Persistable, Session};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;

/// Outcome of a primary-key lookup in the cache.
#[derive(Debug)]
pub enum Cached<T> {
    /// The live instance.
    Hit(Arc<T>),
    /// Known not to exist, or removed in this transaction.
    Absent,
    /// Not known; storage must be asked.
    Miss,
}

/// Primary index and dirty sets of one entity kind.
#[derive(Debug)]
pub struct CacheCore<T: Persistable> {
    // None memoizes a key storage does not have.
    live: HashMap<T::Key, Option<Arc<T>>>,
    added: BTreeMap<T::Key, Arc<T>>,
    modified: BTreeMap<T::Key, Arc<T>>,
    removed: BTreeMap<T::Key, Arc<T>>,
    all_read: bool,
}

impl<T: Persistable> Default for CacheCore<T> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            added: BTreeMap::new(),
            modified: BTreeMap::new(),
            removed: BTreeMap::new(),
            all_read: false,
        }
    }
}

impl<T: Persistable> CacheCore<T> {
    /// Looks up a key without touching storage.
    pub fn get(&self, key: &T::Key) -> Cached<T> {
        if self.removed.contains_key(key) {
            return Cached::Absent;
        }
        match self.live.get(key) {
            Some(Some(entity)) => Cached::Hit(Arc::clone(entity)),
            Some(None) => Cached::Absent,
            None if self.all_read => Cached::Absent,
            None => Cached::Miss,
        }
    }

    /// Returns true once the whole table has been read.
    #[must_use]
    pub const fn all_read(&self) -> bool {
        self.all_read
    }

    /// Returns the number of live cached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.values().filter(|e| e.is_some()).count()
    }

    /// Returns true if no live instance is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds by primary key, reading through to storage on a miss.
    pub fn find_by_key(
        &mut self,
        session: &mut dyn Session,
        key: &T::Key,
    ) -> CoreResult<Option<Arc<T>>> {
        match self.get(key) {
            Cached::Hit(entity) => Ok(Some(entity)),
            Cached::Absent => Ok(None),
            Cached::Miss => {
                tracing::trace!(kind = %T::KIND, ?key, "cache miss");
                match DataAccess::<T>::new(session).find_by_key(key)? {
                    Some(entity) => Ok(self.sync_one(entity)),
                    None => {
                        self.live.insert(key.clone(), None);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Memoizes that storage has no row for `key`, unless the key is
    /// already tracked.
    pub fn mark_absent(&mut self, key: T::Key) {
        self.live.entry(key).or_insert(None);
    }

    /// Reconciles one storage instance with the cache.
    ///
    /// Pending removals hide it, a cached instance replaces it, otherwise it
    /// is adopted.
    pub fn sync_one(&mut self, entity: T) -> Option<Arc<T>> {
        let key = entity.key();
        if self.removed.contains_key(&key) {
            return None;
        }
        match self.live.get(&key) {
            Some(Some(cached)) => Some(Arc::clone(cached)),
            _ => {
                let adopted = Arc::new(entity);
                self.live.insert(key, Some(Arc::clone(&adopted)));
                Some(adopted)
            }
        }
    }

    /// Reconciles a storage result with the cache.
    pub fn sync(&mut self, fetched: Vec<T>) -> Vec<Arc<T>> {
        fetched.into_iter().filter_map(|e| self.sync_one(e)).collect()
    }

    /// Reconciles a filtered storage result and merges matching cached
    /// instances, so uncommitted adds and updates are honoured.
    ///
    /// The result is ordered by primary key.
    pub fn query(&mut self, fetched: Vec<T>, pred: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
        let mut out: BTreeMap<T::Key, Arc<T>> = BTreeMap::new();
        for entity in self.sync(fetched) {
            if pred(&entity) {
                out.insert(entity.key(), entity);
            }
        }
        for entity in self.live.values().flatten() {
            if pred(entity) {
                out.entry(entity.key()).or_insert_with(|| Arc::clone(entity));
            }
        }
        out.into_values().collect()
    }

    /// Returns cached live instances matching `pred`, ordered by key.
    pub fn cached_where(&self, pred: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
        let mut out: Vec<Arc<T>> = self
            .live
            .values()
            .flatten()
            .filter(|e| pred(e))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.key());
        out
    }

    /// Reads the whole table once, then serves it from memory.
    pub fn load_all(&mut self, session: &mut dyn Session) -> CoreResult<Vec<Arc<T>>> {
        if !self.all_read {
            tracing::trace!(kind = %T::KIND, "full scan");
            let fetched = DataAccess::<T>::new(session).find_all()?;
            self.sync(fetched);
            self.all_read = true;
        }
        Ok(self.cached_where(|_| true))
    }

    /// Answers a filtered list from memory after a full scan, otherwise from
    /// storage through `fetch`.
    pub fn list_where(
        &mut self,
        session: &mut dyn Session,
        pred: impl Fn(&T) -> bool,
        fetch: impl FnOnce(&mut DataAccess<'_, T>) -> nnmeta_storage::StorageResult<Vec<T>>,
    ) -> CoreResult<Vec<Arc<T>>> {
        if self.all_read {
            return Ok(self.cached_where(pred));
        }
        let fetched = fetch(&mut DataAccess::<T>::new(session))?;
        Ok(self.query(fetched, pred))
    }

    /// Counts matching rows from memory after a full scan, otherwise with a
    /// storage count query.
    pub fn count_where(
        &mut self,
        session: &mut dyn Session,
        pred: impl Fn(&T) -> bool,
        fetch: impl FnOnce(&mut DataAccess<'_, T>) -> nnmeta_storage::StorageResult<usize>,
    ) -> CoreResult<usize> {
        if self.all_read {
            return Ok(self.cached_where(pred).len());
        }
        Ok(fetch(&mut DataAccess::<T>::new(session))?)
    }

    /// Buffers an insert. Returns the new instance and the one it replaced.
    pub fn add(&mut self, entity: T) -> CoreResult<(Arc<T>, Option<Arc<T>>)> {
        let key = entity.key();
        if self.removed.contains_key(&key) {
            return Err(CoreError::removed_entity(T::KIND, &key));
        }
        let entity = Arc::new(entity);
        let previous = self.live.insert(key.clone(), Some(Arc::clone(&entity))).flatten();
        self.modified.remove(&key);
        self.added.insert(key, Arc::clone(&entity));
        Ok((entity, previous))
    }

    /// Buffers an update. Returns the new instance and the one it replaced.
    pub fn update(&mut self, entity: T) -> CoreResult<(Arc<T>, Option<Arc<T>>)> {
        let key = entity.key();
        if self.removed.contains_key(&key) {
            return Err(CoreError::removed_entity(T::KIND, &key));
        }
        let entity = Arc::new(entity);
        let previous = self.live.insert(key.clone(), Some(Arc::clone(&entity))).flatten();
        if let Some(slot) = self.added.get_mut(&key) {
            *slot = Arc::clone(&entity);
        } else {
            self.modified.insert(key, Arc::clone(&entity));
        }
        Ok((entity, previous))
    }

    /// Buffers a delete. Returns the instance that was live.
    ///
    /// An entity added in this same transaction is simply forgotten; storage
    /// never saw it.
    pub fn remove(&mut self, entity: &T) -> CoreResult<Arc<T>> {
        let key = entity.key();
        let live = match self.live.get(&key) {
            Some(Some(live)) if !self.removed.contains_key(&key) => Arc::clone(live),
            _ => return Err(CoreError::untracked_entity(T::KIND, &key)),
        };
        self.modified.remove(&key);
        if self.added.remove(&key).is_some() {
            self.live.insert(key, None);
        } else {
            self.live.remove(&key);
            self.removed.insert(key, Arc::clone(&live));
        }
        Ok(live)
    }

    /// Forgets everything and marks the table as known empty.
    pub fn truncate(&mut self, session: &mut dyn Session) -> CoreResult<()> {
        self.clear();
        DataAccess::<T>::new(session).remove_all()?;
        self.all_read = true;
        Ok(())
    }

    /// Returns true if anything is buffered for commit.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Returns the sizes of the dirty sets.
    #[must_use]
    pub fn pending(&self) -> PendingWrites {
        PendingWrites {
            added: self.added.len(),
            modified: self.modified.len(),
            removed: self.removed.len(),
        }
    }

    /// Hands the dirty sets to storage as one batch.
    pub fn prepare(&self, session: &mut dyn Session) -> nnmeta_storage::StorageResult<()> {
        DataAccess::<T>::new(session).prepare(
            self.removed.values().map(AsRef::as_ref),
            self.added.values().map(AsRef::as_ref),
            self.modified.values().map(AsRef::as_ref),
        )
    }

    /// Empties every index and dirty set.
    pub fn clear(&mut self) {
        self.live.clear();
        self.added.clear();
        self.modified.clear();
        self.removed.clear();
        self.all_read = false;
    }
}

/// An alternate unique key, e.g. an inode's name within its parent.
#[derive(Debug)]
pub struct UniqueIndex<T: Persistable, I> {
    extract: fn(&T) -> Option<I>,
    // None memoizes a secondary key storage does not have.
    keys: HashMap<I, Option<T::Key>>,
}

impl<T: Persistable, I: Eq + Hash + Clone> UniqueIndex<T, I> {
    /// Creates an index over the secondary key returned by `extract`.
    ///
    /// Entities for which `extract` returns `None` are not indexed.
    pub fn new(extract: fn(&T) -> Option<I>) -> Self {
        Self {
            extract,
            keys: HashMap::new(),
        }
    }

    /// Resolves a secondary key through the cache.
    ///
    /// Returns `Cached::Miss` when the index knows nothing about it.
    pub fn get(&self, core: &CacheCore<T>, index_key: &I) -> Cached<T> {
        match self.keys.get(index_key) {
            None => Cached::Miss,
            Some(None) => Cached::Absent,
            Some(Some(key)) => match core.get(key) {
                Cached::Hit(entity) if (self.extract)(&entity).as_ref() == Some(index_key) => {
                    Cached::Hit(entity)
                }
                Cached::Absent => Cached::Absent,
                _ => Cached::Miss,
            },
        }
    }

    /// Finds by secondary key, reading through to storage on a miss.
    pub fn find(
        &mut self,
        core: &mut CacheCore<T>,
        session: &mut dyn Session,
        index_key: &I,
        fetch: impl FnOnce(&mut DataAccess<'_, T>) -> nnmeta_storage::StorageResult<Option<T>>,
    ) -> CoreResult<Option<Arc<T>>> {
        match self.get(core, index_key) {
            Cached::Hit(entity) => return Ok(Some(entity)),
            Cached::Absent => return Ok(None),
            Cached::Miss => {}
        }
        let extract = self.extract;
        let matches = |e: &T| extract(e).as_ref() == Some(index_key);
        let found = if core.all_read() {
            core.cached_where(matches).into_iter().next()
        } else {
            tracing::trace!(kind = %T::KIND, "secondary key miss");
            let fetched = fetch(&mut DataAccess::new(session))?;
            fetched
                .and_then(|e| core.sync_one(e))
                .filter(|e| matches(e))
                .or_else(|| core.cached_where(matches).into_iter().next())
        };
        self.record(index_key.clone(), found.as_ref());
        Ok(found)
    }

    /// Records the result of a storage lookup by secondary key.
    pub fn record(&mut self, index_key: I, entity: Option<&Arc<T>>) {
        self.keys.insert(index_key, entity.map(|e| e.key()));
    }

    /// Tracks an added or updated entity.
    pub fn insert(&mut self, entity: &T, previous: Option<&T>) {
        if let Some(previous) = previous {
            if let Some(old) = (self.extract)(previous) {
                if self.keys.get(&old) == Some(&Some(previous.key())) {
                    self.keys.remove(&old);
                }
            }
        }
        if let Some(new) = (self.extract)(entity) {
            self.keys.insert(new, Some(entity.key()));
        }
    }

    /// Forgets a removed entity.
    ///
    /// A secondary key another entity has taken over keeps pointing at it.
    pub fn remove(&mut self, entity: &T) {
        if let Some(old) = (self.extract)(entity) {
            match self.keys.get(&old) {
                Some(Some(holder)) if *holder != entity.key() => {}
                _ => {
                    self.keys.insert(old, None);
                }
            }
        }
    }

    /// Empties the index.
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// A foreign-key list index, e.g. the blocks of an inode.
///
/// A list is only held once it is complete for its index key.
#[derive(Debug)]
pub struct ListIndex<T: Persistable, I> {
    extract: fn(&T) -> I,
    lists: HashMap<I, BTreeSet<T::Key>>,
}

impl<T: Persistable, I: Eq + Hash + Clone> ListIndex<T, I> {
    /// Creates an index over the foreign key returned by `extract`.
    pub fn new(extract: fn(&T) -> I) -> Self {
        Self {
            extract,
            lists: HashMap::new(),
        }
    }

    /// Returns the members of a complete list, or `None` if not loaded.
    pub fn get(&self, core: &CacheCore<T>, index_key: &I) -> Option<Vec<Arc<T>>> {
        let keys = self.lists.get(index_key)?;
        Some(
            keys.iter()
                .filter_map(|k| match core.get(k) {
                    Cached::Hit(entity) => Some(entity),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Stores a complete list loaded from storage.
    pub fn load(&mut self, index_key: I, members: &[Arc<T>]) {
        self.lists
            .insert(index_key, members.iter().map(|e| e.key()).collect());
    }

    /// Returns true if `entity` belongs to the list of `index_key`.
    pub fn matches(&self, entity: &T, index_key: &I) -> bool {
        (self.extract)(entity) == *index_key
    }

    /// Tracks an added or updated entity, moving it between lists if its
    /// foreign key changed.
    pub fn insert(&mut self, entity: &T, previous: Option<&T>) {
        let key = entity.key();
        if let Some(previous) = previous {
            let old = (self.extract)(previous);
            if let Some(list) = self.lists.get_mut(&old) {
                list.remove(&key);
            }
        }
        if let Some(list) = self.lists.get_mut(&(self.extract)(entity)) {
            list.insert(key);
        }
    }

    /// Forgets a removed entity.
    pub fn remove(&mut self, entity: &T) {
        if let Some(list) = self.lists.get_mut(&(self.extract)(entity)) {
            list.remove(&entity.key());
        }
    }

    /// Empties the index.
    pub fn clear(&mut self) {
        self.lists.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnmeta_storage::{LeasePath, MemoryDatabase, StorageConnector};

    fn session_with(paths: &[LeasePath]) -> Box<dyn Session> {
        let db = Arc::new(MemoryDatabase::new());
        let mut session = db.connector("t").open_session().unwrap();
        session.begin().unwrap();
        DataAccess::<LeasePath>::new(session.as_mut())
            .prepare([], paths.iter(), [])
            .unwrap();
        session.commit().unwrap();
        session.begin().unwrap();
        session
    }

    #[test]
    fn read_through_memoizes_hits_and_misses() {
        let mut session = session_with(&[LeasePath::new("/a", 1)]);
        let mut core = CacheCore::<LeasePath>::default();

        let first = core.find_by_key(session.as_mut(), &"/a".to_string()).unwrap().unwrap();
        let second = core.find_by_key(session.as_mut(), &"/a".to_string()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(core.find_by_key(session.as_mut(), &"/b".to_string()).unwrap().is_none());
        assert!(matches!(core.get(&"/b".to_string()), Cached::Absent));
        assert_eq!(core.len(), 1);
    }

    #[test]
    fn sync_substitutes_cached_and_hides_removed() {
        let mut core = CacheCore::<LeasePath>::default();
        let (updated, _) = core.update(LeasePath::new("/a", 2)).unwrap();
        core.sync_one(LeasePath::new("/b", 1));
        let b = match core.get(&"/b".to_string()) {
            Cached::Hit(b) => b,
            other => panic!("unexpected {other:?}"),
        };
        core.remove(&b).unwrap();

        let synced = core.sync(vec![LeasePath::new("/a", 1), LeasePath::new("/b", 1)]);
        assert_eq!(synced.len(), 1);
        assert!(Arc::ptr_eq(&synced[0], &updated));
        assert_eq!(synced[0].holder_id, 2);
    }

    #[test]
    fn query_merges_uncommitted_and_drops_rekeyed() {
        let mut core = CacheCore::<LeasePath>::default();
        core.add(LeasePath::new("/new", 7)).unwrap();
        core.update(LeasePath::new("/moved", 8)).unwrap();

        let fetched = vec![LeasePath::new("/old", 7), LeasePath::new("/moved", 7)];
        let result = core.query(fetched, |p| p.holder_id == 7);
        let paths: Vec<_> = result.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/new", "/old"]);
    }

    #[test]
    fn illegal_readd_leaves_indices_untouched() {
        let mut core = CacheCore::<LeasePath>::default();
        let live = core.sync_one(LeasePath::new("/a", 1)).unwrap();
        core.remove(&live).unwrap();
        let before = core.pending();

        let err = core.add(LeasePath::new("/a", 1)).unwrap_err();
        assert!(matches!(err, CoreError::RemovedEntity { .. }));
        assert!(matches!(
            core.update(LeasePath::new("/a", 1)).unwrap_err(),
            CoreError::RemovedEntity { .. }
        ));
        assert_eq!(core.pending(), before);
        assert!(matches!(core.get(&"/a".to_string()), Cached::Absent));
    }

    #[test]
    fn illegal_remove_leaves_dirty_sets_untouched() {
        let mut core = CacheCore::<LeasePath>::default();
        core.add(LeasePath::new("/x", 1)).unwrap();
        let before = core.pending();

        let err = core.remove(&LeasePath::new("/unknown", 1)).unwrap_err();
        assert!(matches!(err, CoreError::UntrackedEntity { .. }));
        assert_eq!(core.pending(), before);

        let live = core.sync_one(LeasePath::new("/y", 1)).unwrap();
        core.remove(&live).unwrap();
        assert!(core.remove(&live).is_err());
    }

    #[test]
    fn removing_a_new_entity_forgets_it() {
        let mut core = CacheCore::<LeasePath>::default();
        let (added, _) = core.add(LeasePath::new("/tmp", 1)).unwrap();
        core.remove(&added).unwrap();
        assert!(core.pending().is_empty());
        assert!(matches!(core.get(&"/tmp".to_string()), Cached::Absent));
        core.add(LeasePath::new("/tmp", 1)).unwrap();
    }

    #[test]
    fn update_of_new_entity_stays_new() {
        let mut core = CacheCore::<LeasePath>::default();
        core.add(LeasePath::new("/a", 1)).unwrap();
        core.update(LeasePath::new("/a", 2)).unwrap();
        assert_eq!(
            core.pending(),
            PendingWrites {
                added: 1,
                modified: 0,
                removed: 0
            }
        );
    }

    #[test]
    fn all_read_only_after_full_scan() {
        let mut session = session_with(&[LeasePath::new("/a", 1), LeasePath::new("/b", 2)]);
        let mut core = CacheCore::<LeasePath>::default();

        core.find_by_key(session.as_mut(), &"/a".to_string()).unwrap();
        assert!(!core.all_read());
        assert!(matches!(core.get(&"/b".to_string()), Cached::Miss));

        let all = core.load_all(session.as_mut()).unwrap();
        assert_eq!(all.len(), 2);
        assert!(core.all_read());
        assert!(matches!(core.get(&"/zzz".to_string()), Cached::Absent));
    }

    #[test]
    fn unique_index_follows_rekeying() {
        fn holder(p: &LeasePath) -> Option<i32> {
            Some(p.holder_id)
        }
        let mut core = CacheCore::<LeasePath>::default();
        let mut index = UniqueIndex::new(holder);

        let (first, _) = core.add(LeasePath::new("/a", 1)).unwrap();
        index.insert(&first, None);
        assert!(matches!(index.get(&core, &1), Cached::Hit(_)));

        let (moved, previous) = core.update(LeasePath::new("/a", 2)).unwrap();
        index.insert(&moved, previous.as_deref());
        assert!(matches!(index.get(&core, &1), Cached::Miss));
        assert!(matches!(index.get(&core, &2), Cached::Hit(_)));

        core.remove(&moved).unwrap();
        index.remove(&moved);
        assert!(matches!(index.get(&core, &2), Cached::Absent));
    }

    #[test]
    fn unique_index_keeps_key_taken_over_by_another_entity() {
        fn holder(p: &LeasePath) -> Option<i32> {
            Some(p.holder_id)
        }
        let mut core = CacheCore::<LeasePath>::default();
        let mut index = UniqueIndex::new(holder);

        let (a, _) = core.add(LeasePath::new("/a", 1)).unwrap();
        index.insert(&a, None);
        let (b, _) = core.add(LeasePath::new("/b", 2)).unwrap();
        index.insert(&b, None);

        let (b, previous) = core.update(LeasePath::new("/b", 1)).unwrap();
        index.insert(&b, previous.as_deref());
        core.remove(&a).unwrap();
        index.remove(&a);

        match index.get(&core, &1) {
            Cached::Hit(found) => assert!(Arc::ptr_eq(&found, &b)),
            other => panic!("expected /b under holder 1, got {other:?}"),
        }
    }

    #[test]
    fn list_index_tracks_membership() {
        fn holder(p: &LeasePath) -> i32 {
            p.holder_id
        }
        let mut core = CacheCore::<LeasePath>::default();
        let mut index = ListIndex::new(holder);
        let a = core.sync_one(LeasePath::new("/a", 1)).unwrap();
        index.load(1, &[a.clone()]);
        index.load(2, &[]);

        let (b, _) = core.add(LeasePath::new("/b", 1)).unwrap();
        index.insert(&b, None);
        assert_eq!(index.get(&core, &1).unwrap().len(), 2);

        let (a2, previous) = core.update(LeasePath::new("/a", 2)).unwrap();
        index.insert(&a2, previous.as_deref());
        assert_eq!(index.get(&core, &1).unwrap().len(), 1);
        assert_eq!(index.get(&core, &2).unwrap().len(), 1);

        core.remove(&b).unwrap();
        index.remove(&b);
        assert!(index.get(&core, &1).unwrap().is_empty());
        assert!(index.get(&core, &3).is_none());
        assert!(index.matches(&a2, &2));
    }
}
