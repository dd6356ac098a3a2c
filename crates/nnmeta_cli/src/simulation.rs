//! Deterministic multi-namenode election simulation.
//!
//! Namenodes take turns heartbeating in start order, one round at a time, so
//! a run is fully reproducible. Stalls stop a namenode's heartbeats for a
//! range of rounds, which is how a crashed or partitioned process looks to
//! the others.

use nnmeta_core::{Config, CoreResult, EntityManager, LeaderConfig, LeaderElection, MetadataStore};
use nnmeta_storage::{EntityKind, MemoryConfig, MemoryDatabase, StorageResult};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Namenode `namenode` skips its heartbeats from round `from` on, up to and
/// including `until` if given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stall {
    /// Position of the namenode in start order, from 1.
    pub namenode: usize,
    /// First skipped round.
    pub from: usize,
    /// Last skipped round.
    pub until: Option<usize>,
}

impl Stall {
    /// Returns true if the namenode skips `round`.
    pub fn covers(&self, namenode: usize, round: usize) -> bool {
        self.namenode == namenode && round >= self.from && self.until.map_or(true, |end| round <= end)
    }
}

impl FromStr for Stall {
    type Err = String;

    /// Parses `N@FROM` or `N@FROM-UNTIL`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namenode, rounds) = s
            .split_once('@')
            .ok_or_else(|| format!("expected NAMENODE@ROUND, got {s:?}"))?;
        let namenode = namenode
            .parse()
            .map_err(|_| format!("invalid namenode {namenode:?}"))?;
        let (from, until) = match rounds.split_once('-') {
            Some((from, until)) => (from, Some(until)),
            None => (rounds, None),
        };
        let from = from.parse().map_err(|_| format!("invalid round {from:?}"))?;
        let until = until
            .map(|until| until.parse().map_err(|_| format!("invalid round {until:?}")))
            .transpose()?;
        Ok(Self {
            namenode,
            from,
            until,
        })
    }
}

impl fmt::Display for Stall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.until {
            Some(until) => write!(f, "{}@{}-{}", self.namenode, self.from, until),
            None => write!(f, "{}@{}", self.namenode, self.from),
        }
    }
}

/// Parameters of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Namenodes to start.
    pub namenodes: usize,
    /// Heartbeat rounds after everyone joined.
    pub rounds: usize,
    /// Missed heartbeat threshold.
    pub delta: i64,
    /// Heartbeat outages.
    pub stalls: Vec<Stall>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            namenodes: 3,
            rounds: 10,
            delta: LeaderConfig::default().missed_heartbeat_threshold,
            stalls: Vec::new(),
        }
    }
}

/// The cluster as seen after one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    /// Round number; zero is the join round.
    pub round: usize,
    /// Leader id.
    pub leader: i64,
    /// Active namenode ids.
    pub active: Vec<i64>,
    /// Current id of each namenode, in start order.
    pub ids: Vec<i64>,
    /// Rows in the Leader table.
    pub rows: usize,
}

/// The outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// Namenodes started.
    pub namenodes: usize,
    /// Missed heartbeat threshold used.
    pub delta: i64,
    /// One entry per round, join round first.
    pub rounds: Vec<RoundReport>,
}

impl SimulationReport {
    /// Returns the leader after the last round.
    pub fn final_leader(&self) -> Option<i64> {
        self.rounds.last().map(|round| round.leader)
    }

    /// Returns the first round whose leader differs from the previous one.
    pub fn first_failover(&self) -> Option<usize> {
        self.rounds
            .windows(2)
            .find(|pair| pair[0].leader != pair[1].leader)
            .map(|pair| pair[1].round)
    }
}

#[derive(Debug)]
struct Namenode {
    em: EntityManager,
    election: LeaderElection,
}

/// A reproducible election run over one shared database.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    db: Arc<MemoryDatabase>,
    store: MetadataStore,
    namenodes: Vec<Namenode>,
}

impl Simulation {
    /// Creates a simulation over `db`. Namenodes already in its Leader
    /// table keep heartbeating only if they are simulated too.
    ///
    /// The election threshold of `config` is replaced by the run's delta.
    pub fn open(
        db: Arc<MemoryDatabase>,
        config: &Config,
        simulation: SimulationConfig,
    ) -> StorageResult<Self> {
        let config = config.clone().leader(
            config
                .leader
                .clone()
                .with_missed_heartbeat_threshold(simulation.delta),
        );
        let store = MetadataStore::new(db.pool(MemoryConfig::default())?, config);
        let namenodes = (1..=simulation.namenodes)
            .map(|n| Namenode {
                em: store.entity_manager(),
                election: LeaderElection::new(
                    &store.config().clone().hostname(format!("nn{n}:8020")),
                ),
            })
            .collect();
        Ok(Self {
            config: simulation,
            db,
            store,
            namenodes,
        })
    }

    /// Returns the database the simulation runs on.
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    /// Joins every namenode, then runs the configured rounds.
    ///
    /// # Errors
    ///
    /// Returns the first election round that failed after retries.
    pub fn run(&mut self) -> CoreResult<SimulationReport> {
        let mut rounds = Vec::with_capacity(self.config.rounds + 1);

        for nn in &mut self.namenodes {
            nn.election.initialize(&mut nn.em)?;
        }
        rounds.push(self.observe(0)?);

        for round in 1..=self.config.rounds {
            for (position, nn) in self.namenodes.iter_mut().enumerate() {
                let stalled = self
                    .config
                    .stalls
                    .iter()
                    .any(|stall| stall.covers(position + 1, round));
                if stalled {
                    tracing::debug!(namenode = position + 1, round, "stalled");
                    continue;
                }
                nn.election.heartbeat(&mut nn.em)?;
            }
            rounds.push(self.observe(round)?);
        }

        Ok(SimulationReport {
            namenodes: self.config.namenodes,
            delta: self.config.delta,
            rounds,
        })
    }

    // Reads the table through an observer that never joins.
    fn observe(&self, round: usize) -> CoreResult<RoundReport> {
        let observer = LeaderElection::new(self.store.config());
        let mut em = self.store.entity_manager();
        let leader = observer.get_leader(&mut em)?;
        let active = observer.active_namenodes(&mut em)?.into_keys().collect();
        Ok(RoundReport {
            round,
            leader,
            active,
            ids: self.namenodes.iter().map(|nn| nn.election.id()).collect(),
            rows: self.db.row_count(EntityKind::Leader),
        })
    }
}
