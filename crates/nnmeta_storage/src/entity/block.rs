//! Block record.

use super::{EntityKind, Persistable};
use crate::error::{StorageError, StorageResult};
use crate::row::Row;
use serde::{Deserialize, Serialize};

/// Construction state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockUcState {
    /// Finalized on enough replicas.
    Complete,
    /// Still being written.
    UnderConstruction,
    /// Lease recovery in progress.
    UnderRecovery,
    /// Client finished writing, replicas not yet reported.
    Committed,
}

impl BlockUcState {
    const fn code(self) -> i64 {
        match self {
            Self::Complete => 0,
            Self::UnderConstruction => 1,
            Self::UnderRecovery => 2,
            Self::Committed => 3,
        }
    }

    fn from_code(code: i64) -> StorageResult<Self> {
        match code {
            0 => Ok(Self::Complete),
            1 => Ok(Self::UnderConstruction),
            2 => Ok(Self::UnderRecovery),
            3 => Ok(Self::Committed),
            other => Err(StorageError::invalid_value("block_under_construction_state", other)),
        }
    }
}

/// A block of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block id.
    pub block_id: i64,
    /// Position of the block within its file.
    pub block_index: i32,
    /// Owning inode.
    pub inode_id: i64,
    /// Length in bytes.
    pub num_bytes: i64,
    /// Generation stamp.
    pub generation_stamp: i64,
    /// Construction state.
    pub uc_state: BlockUcState,
    /// Last state change in milliseconds.
    pub time_stamp: i64,
    /// Replica chosen as primary during recovery.
    pub primary_node_index: i32,
    /// Recovery id, when under recovery.
    pub block_recovery_id: i64,
}

impl BlockInfo {
    /// Creates a complete block.
    #[must_use]
    pub fn new(block_id: i64, inode_id: i64, block_index: i32) -> Self {
        Self {
            block_id,
            block_index,
            inode_id,
            num_bytes: 0,
            generation_stamp: 0,
            uc_state: BlockUcState::Complete,
            time_stamp: 0,
            primary_node_index: -1,
            block_recovery_id: 0,
        }
    }

    /// Returns true unless the block is complete.
    #[must_use]
    pub fn is_under_construction(&self) -> bool {
        self.uc_state != BlockUcState::Complete
    }
}

impl Persistable for BlockInfo {
    type Key = i64;
    const KIND: EntityKind = EntityKind::BlockInfo;

    fn key(&self) -> i64 {
        self.block_id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("block_index", self.block_index)
            .with("inode_id", self.inode_id)
            .with("num_bytes", self.num_bytes)
            .with("generation_stamp", self.generation_stamp)
            .with("block_under_construction_state", self.uc_state.code())
            .with("time_stamp", self.time_stamp)
            .with("primary_node_index", self.primary_node_index)
            .with("block_recovery_id", self.block_recovery_id)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            block_index: row.int32("block_index")?,
            inode_id: row.int("inode_id")?,
            num_bytes: row.int("num_bytes")?,
            generation_stamp: row.int("generation_stamp")?,
            uc_state: BlockUcState::from_code(row.int("block_under_construction_state")?)?,
            time_stamp: row.int("time_stamp")?,
            primary_node_index: row.int32("primary_node_index")?,
            block_recovery_id: row.int("block_recovery_id")?,
        })
    }
}
