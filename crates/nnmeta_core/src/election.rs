//! Leader election over the shared `Leader` table.
//!
//! Every namenode owns one row and, once per round, sets its counter one past
//! the highest counter in the table. A namenode is *active* while its counter
//! stays above
//!
//! ```text
//! threshold = max_counter - total_namenodes * missed_heartbeat_threshold
//! ```
//!
//! and the active namenode with the smallest id leads. There is no message
//! passing; a namenode that stops heartbeating simply falls below the
//! threshold.
//!
//! A namenode that becomes leader deletes every row with a smaller id, so a
//! stalled predecessor can never win again. If that predecessor comes back it
//! finds its row gone and re-joins under a fresh id.

use crate::config::Config;
use crate::context::{LeaderCounter, LeaderFinder, LeaderListFinder};
use crate::error::CoreResult;
use crate::handler::{OperationKind, TransactionalRequestHandler};
use crate::manager::EntityManager;
use nnmeta_storage::{Leader, LockMode};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reported as leader while the table is empty, and used as the id of a
/// namenode that has not joined yet.
pub const LEADER_INITIALIZATION_ID: i64 = -1;

/// Returns the counter a row must exceed to count as active.
#[must_use]
pub fn election_threshold(max_counter: i64, total_namenodes: usize, delta: i64) -> i64 {
    let total = i64::try_from(total_namenodes).unwrap_or(i64::MAX);
    max_counter.saturating_sub(total.saturating_mul(delta))
}

/// Returns the rows above the election threshold, in input order.
pub fn active_rows<L: Borrow<Leader>>(rows: &[L], delta: i64) -> Vec<&Leader> {
    let Some(max_counter) = rows.iter().map(|row| row.borrow().counter).max() else {
        return Vec::new();
    };
    let threshold = election_threshold(max_counter, rows.len(), delta);
    rows.iter()
        .map(Borrow::borrow)
        .filter(|row| row.counter > threshold)
        .collect()
}

/// Returns the id of the leader among `rows`, or
/// [`LEADER_INITIALIZATION_ID`] if there are none.
#[must_use]
pub fn select_leader<L: Borrow<Leader>>(rows: &[L], delta: i64) -> i64 {
    active_rows(rows, delta)
        .iter()
        .map(|row| row.id)
        .min()
        .unwrap_or(LEADER_INITIALIZATION_ID)
}

/// What a namenode currently believes it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamenodeRole {
    /// Elected leader.
    Leader,
    /// Any other running namenode.
    Namenode,
}

impl fmt::Display for NamenodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leader => f.write_str("leader"),
            Self::Namenode => f.write_str("namenode"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Round {
    id: i64,
    leader: i64,
}

/// One namenode's view of the election.
///
/// The election state lives here; all persistence goes through the
/// [`EntityManager`] handed to each call, so a process runs its election on a
/// manager of its own.
#[derive(Debug, Clone)]
pub struct LeaderElection {
    id: i64,
    hostname: String,
    role: NamenodeRole,
    leader_id: i64,
    config: Config,
}

impl LeaderElection {
    /// Creates the election state of a namenode that has not joined yet.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            id: LEADER_INITIALIZATION_ID,
            hostname: config.hostname.clone(),
            role: NamenodeRole::Namenode,
            leader_id: LEADER_INITIALIZATION_ID,
            config: config.clone(),
        }
    }

    /// Reuses `id` if its row still exists when the namenode joins.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Returns this namenode's id, or [`LEADER_INITIALIZATION_ID`] before
    /// it joined.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Returns the host name written to this namenode's row.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the role decided by the last round.
    #[must_use]
    pub const fn role(&self) -> NamenodeRole {
        self.role
    }

    /// Returns true if the last round elected this namenode.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.role == NamenodeRole::Leader
    }

    /// Returns the leader seen by the last round.
    #[must_use]
    pub const fn leader_id(&self) -> i64 {
        self.leader_id
    }

    /// Joins the election and runs the first round. Returns the leader id.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn initialize(&mut self, em: &mut EntityManager) -> CoreResult<i64> {
        let leader = self.round(em, OperationKind::LeaderElection)?;
        tracing::info!(id = self.id, leader, role = %self.role, "joined leader election");
        Ok(leader)
    }

    /// Refreshes this namenode's row and re-evaluates the leader.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn heartbeat(&mut self, em: &mut EntityManager) -> CoreResult<i64> {
        self.round(em, OperationKind::LeaderElection)
    }

    /// Writes this namenode's heartbeat without re-evaluating the leader.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn update_counter(&mut self, em: &mut EntityManager) -> CoreResult<()> {
        let (id, hostname) = (self.id, self.hostname.as_str());
        let id = self
            .handler(OperationKind::UpdateLeaderCounter)
            .handle(em, |em| refresh_row(em, id, hostname))?;
        self.adopt_id(id);
        Ok(())
    }

    /// Re-evaluates the leader without heartbeating. If this namenode was
    /// just elected, its stale predecessors are removed.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn determine_and_set_leader(&mut self, em: &mut EntityManager) -> CoreResult<i64> {
        let (id, role, delta) = (self.id, self.role, self.delta());
        let leader = self
            .handler(OperationKind::LeaderElection)
            .handle(em, |em| elect(em, id, role, delta))?;
        self.apply(Round { id, leader });
        Ok(leader)
    }

    /// Returns the current leader id without changing anything.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn get_leader(&self, em: &mut EntityManager) -> CoreResult<i64> {
        let delta = self.delta();
        self.handler(OperationKind::GetLeader)
            .handle(em, |em| current_leader(em, delta))
    }

    /// Returns the active namenodes by id, with their host names.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn active_namenodes(&self, em: &mut EntityManager) -> CoreResult<BTreeMap<i64, String>> {
        let delta = self.delta();
        self.handler(OperationKind::SelectAllNamenodes)
            .handle(em, |em| {
                let rows = em.find_list::<Leader>(&LeaderListFinder::All)?;
                Ok(active_rows(&rows, delta)
                    .into_iter()
                    .map(|row| (row.id, row.hostname.clone()))
                    .collect())
            })
    }

    /// Returns the number of rows with a smaller id than this namenode.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn predecessor_count(&self, em: &mut EntityManager) -> CoreResult<usize> {
        let id = self.id;
        self.handler(OperationKind::SelectAllNamenodes)
            .handle(em, |em| em.count::<Leader>(&LeaderCounter::AllPredecessors(id)))
    }

    /// Returns the number of rows with a larger id than this namenode.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn successor_count(&self, em: &mut EntityManager) -> CoreResult<usize> {
        let id = self.id;
        self.handler(OperationKind::SelectAllNamenodes)
            .handle(em, |em| em.count::<Leader>(&LeaderCounter::AllSuccessors(id)))
    }

    /// Removes this namenode's row on a clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns the handler's error once retries are exhausted.
    pub fn leave(&mut self, em: &mut EntityManager) -> CoreResult<()> {
        let id = self.id;
        self.handler(OperationKind::LeaderElection).handle(em, |em| {
            if let Some(row) = em.find::<Leader>(&LeaderFinder::ById(id))? {
                em.remove(&*row)?;
            }
            Ok(())
        })?;
        tracing::info!(id, "left leader election");
        self.role = NamenodeRole::Namenode;
        self.id = LEADER_INITIALIZATION_ID;
        Ok(())
    }

    /// Heartbeats every check interval until `shutdown` is set.
    ///
    /// # Errors
    ///
    /// Returns the first round that failed after retries; the namenode is
    /// expected to stop.
    pub fn run(&mut self, em: &mut EntityManager, shutdown: &AtomicBool) -> CoreResult<()> {
        let interval = self.config.leader.check_interval();
        while !shutdown.load(Ordering::Acquire) {
            self.heartbeat(em)?;
            thread::sleep(interval);
        }
        tracing::debug!(id = self.id, "leader election stopped");
        Ok(())
    }

    fn round(&mut self, em: &mut EntityManager, op: OperationKind) -> CoreResult<i64> {
        let (id, role, delta) = (self.id, self.role, self.delta());
        let hostname = self.hostname.as_str();
        let round = self.handler(op).handle(em, |em| {
            let id = refresh_row(em, id, hostname)?;
            let leader = elect(em, id, role, delta)?;
            Ok(Round { id, leader })
        })?;
        self.apply(round);
        Ok(round.leader)
    }

    fn handler(&self, op: OperationKind) -> TransactionalRequestHandler<'static> {
        TransactionalRequestHandler::new(op, &self.config).with_lock_mode(LockMode::ReadCommitted)
    }

    const fn delta(&self) -> i64 {
        self.config.leader.missed_heartbeat_threshold
    }

    fn adopt_id(&mut self, id: i64) {
        if id == self.id {
            return;
        }
        if self.id != LEADER_INITIALIZATION_ID {
            tracing::warn!(old = self.id, new = id, "leader row was removed, re-joined");
            self.role = NamenodeRole::Namenode;
        }
        self.id = id;
    }

    fn apply(&mut self, round: Round) {
        self.adopt_id(round.id);
        self.leader_id = round.leader;
        let role = if round.leader == self.id {
            NamenodeRole::Leader
        } else {
            NamenodeRole::Namenode
        };
        if role != self.role {
            match role {
                NamenodeRole::Leader => tracing::info!(id = self.id, "elected leader"),
                NamenodeRole::Namenode => {
                    tracing::warn!(id = self.id, leader = round.leader, "no longer the leader");
                }
            }
            self.role = role;
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

// Writes the heartbeat and returns the id the row was written under.
fn refresh_row(em: &mut EntityManager, id: i64, hostname: &str) -> CoreResult<i64> {
    let rows = em.find_list::<Leader>(&LeaderListFinder::All)?;
    let max_counter = rows.iter().map(|row| row.counter).max().unwrap_or(0);
    let max_id = rows.iter().map(|row| row.id).max().unwrap_or(0);

    let exists = id != LEADER_INITIALIZATION_ID
        && em.find::<Leader>(&LeaderFinder::ById(id))?.is_some();
    if exists {
        em.update(Leader::new(id, max_counter + 1, now_millis(), hostname))?;
        Ok(id)
    } else {
        let id = max_id + 1;
        em.add(Leader::new(id, max_counter + 1, now_millis(), hostname))?;
        Ok(id)
    }
}

fn current_leader(em: &mut EntityManager, delta: i64) -> CoreResult<i64> {
    let rows = em.find_list::<Leader>(&LeaderListFinder::All)?;
    let total = em.count::<Leader>(&LeaderCounter::All)?;
    if total == 0 {
        tracing::warn!("no namenodes registered, the first to start leads");
        return Ok(LEADER_INITIALIZATION_ID);
    }
    let max_counter = rows.iter().map(|row| row.counter).max().unwrap_or(0);
    let threshold = election_threshold(max_counter, total, delta);
    let active = em.find_list::<Leader>(&LeaderListFinder::AllByCounterGreaterThan(threshold))?;
    Ok(active
        .iter()
        .map(|row| row.id)
        .min()
        .unwrap_or(LEADER_INITIALIZATION_ID))
}

fn elect(em: &mut EntityManager, id: i64, role: NamenodeRole, delta: i64) -> CoreResult<i64> {
    let leader = current_leader(em, delta)?;
    if leader == id && leader != LEADER_INITIALIZATION_ID && role != NamenodeRole::Leader {
        remove_predecessors(em, id)?;
    }
    Ok(leader)
}

// Rows go in id order so that two leaders cleaning up at once touch them in
// the same sequence.
fn remove_predecessors(em: &mut EntityManager, id: i64) -> CoreResult<()> {
    let mut stale = em.find_list::<Leader>(&LeaderListFinder::AllByIdLessThan(id))?;
    stale.sort_by_key(|row| row.id);
    for row in &stale {
        em.remove(&**row)?;
    }
    if !stale.is_empty() {
        tracing::info!(id, removed = stale.len(), "removed stale predecessors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeaderConfig;
    use crate::transaction::ContextRegistry;
    use nnmeta_storage::{EntityKind, MemoryConfig, MemoryDatabase};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn rows(pairs: &[(i64, i64)]) -> Vec<Leader> {
        pairs
            .iter()
            .map(|&(id, counter)| Leader::new(id, counter, 0, format!("nn{id}")))
            .collect()
    }

    fn config(delta: i64) -> Config {
        Config::new().leader(LeaderConfig::default().with_missed_heartbeat_threshold(delta))
    }

    fn manager(db: &Arc<MemoryDatabase>, config: &Config) -> EntityManager {
        let pool = Arc::new(db.pool(MemoryConfig::default()).unwrap());
        EntityManager::new(pool, Arc::new(ContextRegistry::standard()), config)
    }

    #[test]
    fn threshold_example() {
        let table = rows(&[(1, 100), (2, 98), (3, 10)]);
        assert_eq!(election_threshold(100, 3, 5), 85);
        let active: Vec<i64> = active_rows(&table, 5).iter().map(|row| row.id).collect();
        assert_eq!(active, vec![1, 2]);
        assert_eq!(select_leader(&table, 5), 1);
    }

    #[test]
    fn stalled_leader_loses() {
        let table = rows(&[(1, 100), (2, 120), (3, 118)]);
        assert_eq!(select_leader(&table, 5), 2);
    }

    #[test]
    fn empty_table_reports_initialization() {
        assert_eq!(select_leader::<Leader>(&[], 2), LEADER_INITIALIZATION_ID);
        assert!(active_rows::<Leader>(&[], 2).is_empty());
    }

    proptest! {
        #[test]
        fn leader_is_min_active_id(
            counters in prop::collection::vec(0i64..1_000, 1..12),
            delta in 0i64..10,
        ) {
            let table: Vec<Leader> = counters
                .iter()
                .enumerate()
                .map(|(i, &counter)| Leader::new(i as i64 + 1, counter, 0, "nn"))
                .collect();
            let active = active_rows(&table, delta);
            let max = counters.iter().copied().max().unwrap();
            prop_assert!(active.iter().all(|row| row.counter > election_threshold(max, table.len(), delta)));
            if delta > 0 {
                prop_assert!(active.iter().any(|row| row.counter == max));
            }
            let leader = select_leader(&table, delta);
            match active.iter().map(|row| row.id).min() {
                Some(min) => prop_assert_eq!(leader, min),
                None => prop_assert_eq!(leader, LEADER_INITIALIZATION_ID),
            }
        }
    }

    #[test]
    fn first_namenode_elects_itself() {
        let db = Arc::new(MemoryDatabase::new());
        let config = config(2).hostname("nn-a");
        let mut em = manager(&db, &config);
        let mut election = LeaderElection::new(&config);

        let leader = election.initialize(&mut em).unwrap();
        assert_eq!(election.id(), 1);
        assert_eq!(leader, 1);
        assert!(election.is_leader());
        assert_eq!(db.row_count(EntityKind::Leader), 1);

        let active = election.active_namenodes(&mut em).unwrap();
        assert_eq!(active.get(&1).map(String::as_str), Some("nn-a"));
    }

    #[test]
    fn later_namenodes_follow() {
        let db = Arc::new(MemoryDatabase::new());
        let config = config(2);
        let (mut em1, mut em2) = (manager(&db, &config), manager(&db, &config));
        let mut first = LeaderElection::new(&config);
        let mut second = LeaderElection::new(&config);

        first.initialize(&mut em1).unwrap();
        assert_eq!(second.initialize(&mut em2).unwrap(), 1);
        assert_eq!(second.id(), 2);
        assert!(!second.is_leader());
        assert_eq!(second.predecessor_count(&mut em2).unwrap(), 1);
        assert_eq!(first.successor_count(&mut em1).unwrap(), 1);
        assert_eq!(first.get_leader(&mut em1).unwrap(), 1);
    }

    #[test]
    fn failover_removes_predecessor_and_stale_node_rejoins() {
        let db = Arc::new(MemoryDatabase::new());
        let config = config(2);
        let (mut em1, mut em2) = (manager(&db, &config), manager(&db, &config));
        let mut first = LeaderElection::new(&config);
        let mut second = LeaderElection::new(&config);
        first.initialize(&mut em1).unwrap();
        second.initialize(&mut em2).unwrap();

        // The first namenode stalls while the second keeps heartbeating.
        for _ in 0..5 {
            second.heartbeat(&mut em2).unwrap();
        }
        assert!(second.is_leader());
        assert_eq!(second.leader_id(), 2);
        assert_eq!(db.row_count(EntityKind::Leader), 1);

        first.heartbeat(&mut em1).unwrap();
        assert_eq!(first.id(), 3);
        assert!(!first.is_leader());
        assert_eq!(first.leader_id(), 2);
    }

    #[test]
    fn split_update_and_determine() {
        let db = Arc::new(MemoryDatabase::new());
        let config = config(2);
        let mut em = manager(&db, &config);
        let mut election = LeaderElection::new(&config).with_id(7);

        election.update_counter(&mut em).unwrap();
        assert_eq!(election.id(), 1, "a missing row is re-created under max id + 1");
        assert_eq!(election.determine_and_set_leader(&mut em).unwrap(), 1);
        assert!(election.is_leader());

        election.leave(&mut em).unwrap();
        assert_eq!(db.row_count(EntityKind::Leader), 0);
        assert_eq!(election.get_leader(&mut em).unwrap(), LEADER_INITIALIZATION_ID);
    }

    #[test]
    fn run_stops_on_shutdown() {
        let db = Arc::new(MemoryDatabase::new());
        let config = config(2).leader(
            LeaderConfig::default().with_check_interval(std::time::Duration::from_millis(1)),
        );
        let mut em = manager(&db, &config);
        let mut election = LeaderElection::new(&config);
        let shutdown = AtomicBool::new(true);
        election.run(&mut em, &shutdown).unwrap();
        assert_eq!(db.row_count(EntityKind::Leader), 0);
    }
}
