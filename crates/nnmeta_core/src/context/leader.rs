//! Leader election and counter row caches.

use super::{CacheCore, CachedEntity, Count, EntityContext, UniqueIndex};
use crate::error::CoreResult;
use nnmeta_storage::{Counter, Leader, Session};
use std::sync::Arc;

/// Single leader-row lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderFinder {
    /// By namenode id.
    ById(i64),
}

/// Leader-row list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderListFinder {
    /// Every row.
    All,
    /// Rows whose counter is strictly greater than the value.
    AllByCounterGreaterThan(i64),
    /// Rows whose id is strictly less than the value.
    AllByIdLessThan(i64),
}

/// Leader-row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderCounter {
    /// Every row.
    All,
    /// Rows with a smaller id.
    AllPredecessors(i64),
    /// Rows with a larger id.
    AllSuccessors(i64),
}

/// Single counter lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterFinder {
    /// By counter id.
    ById(i32),
    /// By counter name.
    ByName(String),
}

/// Counter list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterListFinder {
    /// Every counter.
    All,
}

impl CachedEntity for Leader {
    type Finder = LeaderFinder;
    type ListFinder = LeaderListFinder;
    type Counter = LeaderCounter;
    type Context = LeaderContext;
}

impl CachedEntity for Counter {
    type Finder = CounterFinder;
    type ListFinder = CounterListFinder;
    type Counter = Count;
    type Context = CounterContext;
}

/// One row per running namenode.
#[derive(Debug, Default)]
pub struct LeaderContext {
    core: CacheCore<Leader>,
}

impl EntityContext for LeaderContext {
    type Entity = Leader;

    fn core(&self) -> &CacheCore<Leader> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<Leader> {
        &mut self.core
    }

    fn find(&mut self, session: &mut dyn Session, finder: &LeaderFinder) -> CoreResult<Option<Arc<Leader>>> {
        match finder {
            LeaderFinder::ById(id) => self.core.find_by_key(session, id),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &LeaderListFinder,
    ) -> CoreResult<Vec<Arc<Leader>>> {
        match *finder {
            LeaderListFinder::All => self.core.load_all(session),
            LeaderListFinder::AllByCounterGreaterThan(counter) => self.core.list_where(
                session,
                |l| l.counter > counter,
                |access| access.find_by_counter_gt(counter),
            ),
            LeaderListFinder::AllByIdLessThan(id) => self.core.list_where(
                session,
                |l| l.id < id,
                |access| access.find_by_id_lt(id),
            ),
        }
    }

    fn count(&mut self, session: &mut dyn Session, counter: &LeaderCounter) -> CoreResult<usize> {
        match *counter {
            LeaderCounter::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
            LeaderCounter::AllPredecessors(id) => self.core.count_where(
                session,
                |l| l.id < id,
                |access| access.count_predecessors(id),
            ),
            LeaderCounter::AllSuccessors(id) => self.core.count_where(
                session,
                |l| l.id > id,
                |access| access.count_successors(id),
            ),
        }
    }
}

fn counter_name(counter: &Counter) -> Option<String> {
    Some(counter.name.clone())
}

/// Named cluster-wide counters.
#[derive(Debug)]
pub struct CounterContext {
    core: CacheCore<Counter>,
    by_name: UniqueIndex<Counter, String>,
}

impl Default for CounterContext {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_name: UniqueIndex::new(counter_name),
        }
    }
}

impl EntityContext for CounterContext {
    type Entity = Counter;

    fn core(&self) -> &CacheCore<Counter> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<Counter> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &CounterFinder,
    ) -> CoreResult<Option<Arc<Counter>>> {
        match finder {
            CounterFinder::ById(id) => self.core.find_by_key(session, id),
            CounterFinder::ByName(name) => self.by_name.find(&mut self.core, session, name, |access| {
                access.find_by_name(name)
            }),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &CounterListFinder,
    ) -> CoreResult<Vec<Arc<Counter>>> {
        match finder {
            CounterListFinder::All => self.core.load_all(session),
        }
    }

    fn index_insert(&mut self, counter: &Counter, previous: Option<&Counter>) {
        self.by_name.insert(counter, previous);
    }

    fn index_remove(&mut self, counter: &Counter) {
        self.by_name.remove(counter);
    }

    fn clear_indices(&mut self) {
        self.by_name.clear();
    }
}
