//! Namenode metadata configuration.

use nnmeta_storage::LockMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Leader election tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderConfig {
    /// Pause between election rounds, in milliseconds.
    pub check_interval_ms: u64,

    /// Heartbeat rounds a namenode may miss, per running namenode, before it
    /// drops out of the active set.
    pub missed_heartbeat_threshold: i64,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1_000,
            missed_heartbeat_threshold: 2,
        }
    }
}

impl LeaderConfig {
    /// Returns the pause between election rounds.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Sets the pause between election rounds.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the missed heartbeat threshold.
    #[must_use]
    pub const fn with_missed_heartbeat_threshold(mut self, rounds: i64) -> Self {
        self.missed_heartbeat_threshold = rounds;
        self
    }
}

/// Configuration shared by the transaction and election layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attempts a request handler makes before giving up.
    pub retry_count: u32,

    /// Lock mode for backend reads unless a handler overrides it.
    pub lock_mode: LockMode,

    /// Host name recorded in this process's leader row.
    pub hostname: String,

    /// Leader election tuning.
    pub leader: LeaderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_count: 3,
            lock_mode: LockMode::ReadCommitted,
            hostname: "localhost".to_string(),
            leader: LeaderConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget. Zero is treated as one attempt.
    #[must_use]
    pub const fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the default lock mode.
    #[must_use]
    pub const fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Sets the host name.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the leader election tuning.
    #[must_use]
    pub fn leader(mut self, leader: LeaderConfig) -> Self {
        self.leader = leader;
        self
    }

    /// Returns the number of attempts a handler makes.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.retry_count == 0 {
            1
        } else {
            self.retry_count
        }
    }
}
