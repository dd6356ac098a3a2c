//! The namesystem-wide reader/writer lock.
//!
//! This lock sits above per-transaction isolation. It protects invariants
//! spanning several entity kinds, such as "no concurrent mutation of the
//! same subtree", which row locks alone cannot express.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::thread::{self, ThreadId};

/// Which side of the namesystem lock a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

/// The coarse-grained lock a transactional handler may take.
///
/// Implementations must be reentrant with multi-reader/single-writer
/// semantics. Every lock call is paired with exactly one unlock call by the
/// same thread.
pub trait Namesystem: Send + Sync {
    /// Blocks until shared access is granted.
    fn read_lock(&self);

    /// Releases one shared hold.
    fn read_unlock(&self);

    /// Blocks until exclusive access is granted.
    fn write_lock(&self);

    /// Releases one exclusive hold.
    fn write_unlock(&self);

    /// Returns the id of the namenode owning this namesystem, if known.
    fn namenode_id(&self) -> Option<i64> {
        None
    }
}

/// Holds one side of a [`Namesystem`] lock until dropped.
#[must_use = "the lock is released when the guard is dropped"]
pub struct NamesystemGuard<'a> {
    namesystem: &'a dyn Namesystem,
    kind: LockKind,
}

impl<'a> NamesystemGuard<'a> {
    /// Acquires `kind` on `namesystem`.
    pub fn acquire(namesystem: &'a dyn Namesystem, kind: LockKind) -> Self {
        match kind {
            LockKind::Read => namesystem.read_lock(),
            LockKind::Write => namesystem.write_lock(),
        }
        Self { namesystem, kind }
    }

    /// Returns the side held.
    #[must_use]
    pub const fn kind(&self) -> LockKind {
        self.kind
    }
}

impl Drop for NamesystemGuard<'_> {
    fn drop(&mut self) {
        match self.kind {
            LockKind::Read => self.namesystem.read_unlock(),
            LockKind::Write => self.namesystem.write_unlock(),
        }
    }
}

impl fmt::Debug for NamesystemGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamesystemGuard")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct LockState {
    writer: Option<ThreadId>,
    write_holds: u32,
    readers: HashMap<ThreadId, u32>,
}

impl LockState {
    fn can_read(&self, me: ThreadId) -> bool {
        self.writer.is_none_or(|writer| writer == me)
    }

    fn can_write(&self, me: ThreadId) -> bool {
        match self.writer {
            Some(writer) => writer == me,
            None => self.readers.keys().all(|reader| *reader == me),
        }
    }
}

/// A reentrant multi-reader/single-writer lock.
///
/// The thread holding the write lock may also take read locks, and a
/// reader may take the write lock while it is the only reader.
#[derive(Debug, Default)]
pub struct NamesystemLock {
    namenode_id: Option<i64>,
    state: Mutex<LockState>,
    released: Condvar,
}

impl NamesystemLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unlocked lock owned by namenode `id`.
    #[must_use]
    pub fn for_namenode(id: i64) -> Self {
        Self {
            namenode_id: Some(id),
            ..Self::default()
        }
    }

    /// Returns the number of shared holds across all threads.
    #[must_use]
    pub fn read_holds(&self) -> u32 {
        self.state.lock().readers.values().sum()
    }

    /// Returns true if some thread holds the write lock.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer.is_some()
    }
}

impl Namesystem for NamesystemLock {
    fn read_lock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while !state.can_read(me) {
            self.released.wait(&mut state);
        }
        *state.readers.entry(me).or_insert(0) += 1;
    }

    fn read_unlock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.readers.get_mut(&me) {
            Some(holds) if *holds > 1 => *holds -= 1,
            Some(_) => {
                state.readers.remove(&me);
            }
            None => {
                tracing::warn!("read_unlock without a read hold");
                return;
            }
        }
        drop(state);
        self.released.notify_all();
    }

    fn write_lock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while !state.can_write(me) {
            self.released.wait(&mut state);
        }
        state.writer = Some(me);
        state.write_holds += 1;
    }

    fn write_unlock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.writer != Some(me) {
            tracing::warn!("write_unlock without the write hold");
            return;
        }
        state.write_holds -= 1;
        if state.write_holds == 0 {
            state.writer = None;
        }
        drop(state);
        self.released.notify_all();
    }

    fn namenode_id(&self) -> Option<i64> {
        self.namenode_id
    }
}
