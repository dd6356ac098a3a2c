//! Replication queue records.

use super::{EntityKind, Persistable};
use crate::error::StorageResult;
use crate::row::Row;
use serde::{Deserialize, Serialize};

/// A block waiting in the replication queue at some priority level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderReplicatedBlock {
    /// Block id.
    pub block_id: i64,
    /// Priority level, lower is more urgent.
    pub level: i32,
}

impl UnderReplicatedBlock {
    /// Creates a queue entry.
    #[must_use]
    pub const fn new(block_id: i64, level: i32) -> Self {
        Self { block_id, level }
    }
}

impl Persistable for UnderReplicatedBlock {
    type Key = i64;
    const KIND: EntityKind = EntityKind::UnderReplicatedBlock;

    fn key(&self) -> i64 {
        self.block_id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("level", self.level)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            level: row.int32("level")?,
        })
    }
}

/// Replication work already handed to datanodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBlockInfo {
    /// Block id.
    pub block_id: i64,
    /// When the work was scheduled, in milliseconds.
    pub time_stamp: i64,
    /// Replications still in flight.
    pub num_replicas_in_progress: i32,
}

impl PendingBlockInfo {
    /// Creates a pending record.
    #[must_use]
    pub const fn new(block_id: i64, time_stamp: i64, num_replicas_in_progress: i32) -> Self {
        Self {
            block_id,
            time_stamp,
            num_replicas_in_progress,
        }
    }
}

impl Persistable for PendingBlockInfo {
    type Key = i64;
    const KIND: EntityKind = EntityKind::PendingBlock;

    fn key(&self) -> i64 {
        self.block_id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("time_stamp", self.time_stamp)
            .with("num_replicas_in_progress", self.num_replicas_in_progress)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            time_stamp: row.int("time_stamp")?,
            num_replicas_in_progress: row.int32("num_replicas_in_progress")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let urb = UnderReplicatedBlock::new(3, 2);
        assert_eq!(UnderReplicatedBlock::from_row(&urb.to_row()).unwrap(), urb);

        let pending = PendingBlockInfo::new(3, 1_000, 2);
        assert_eq!(PendingBlockInfo::from_row(&pending.to_row()).unwrap(), pending);
    }
}
