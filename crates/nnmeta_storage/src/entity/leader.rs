//! Leader election and counter rows.

use super::{EntityKind, Persistable};
use crate::error::StorageResult;
use crate::row::Row;
use serde::{Deserialize, Serialize};

/// One row per running namenode process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    /// Namenode id, never reused.
    pub id: i64,
    /// Heartbeat counter.
    pub counter: i64,
    /// Last heartbeat in milliseconds.
    pub timestamp: i64,
    /// Host the namenode runs on.
    pub hostname: String,
    /// Reported request latency, informational.
    pub avg_request_processing_latency: i32,
    /// Partition key column, always zero.
    pub partition_val: i32,
}

impl Leader {
    /// Creates a leader row.
    #[must_use]
    pub fn new(id: i64, counter: i64, timestamp: i64, hostname: impl Into<String>) -> Self {
        Self {
            id,
            counter,
            timestamp,
            hostname: hostname.into(),
            avg_request_processing_latency: 0,
            partition_val: 0,
        }
    }
}

impl Persistable for Leader {
    type Key = i64;
    const KIND: EntityKind = EntityKind::Leader;

    fn key(&self) -> i64 {
        self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("counter", self.counter)
            .with("timestamp", self.timestamp)
            .with("hostname", self.hostname.as_str())
            .with("avg_request_processing_latency", self.avg_request_processing_latency)
            .with("partition_val", self.partition_val)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            id: row.int("id")?,
            counter: row.int("counter")?,
            timestamp: row.int("timestamp")?,
            hostname: row.text("hostname")?,
            avg_request_processing_latency: row.int32("avg_request_processing_latency")?,
            partition_val: row.int32("partition_val")?,
        })
    }
}

/// A named monotonic counter, e.g. the generation stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Counter id.
    pub id: i32,
    /// Counter name.
    pub name: String,
    /// Current value.
    pub value: i64,
}

impl Counter {
    /// Creates a counter row.
    #[must_use]
    pub fn new(id: i32, name: impl Into<String>, value: i64) -> Self {
        Self {
            id,
            name: name.into(),
            value,
        }
    }
}

impl Persistable for Counter {
    type Key = i32;
    const KIND: EntityKind = EntityKind::Counter;

    fn key(&self) -> i32 {
        self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("value", self.value)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            id: row.int32("id")?,
            name: row.text("name")?,
            value: row.int("value")?,
        })
    }
}
