//! Per-storage replica records.
//!
//! All of these are keyed by `(block_id, storage_id)`.

use super::{EntityKind, Persistable};
use crate::error::{StorageError, StorageResult};
use crate::row::Row;
use serde::{Deserialize, Serialize};

/// A record describing one replica of a block on one storage.
pub trait ReplicaRecord: Persistable<Key = (i64, i32)> {
    /// Block id.
    fn block_id(&self) -> i64;

    /// Storage id.
    fn storage_id(&self) -> i32;
}

macro_rules! replica_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ReplicaRecord for $ty {
                fn block_id(&self) -> i64 {
                    self.block_id
                }

                fn storage_id(&self) -> i32 {
                    self.storage_id
                }
            }
        )*
    };
}

replica_record!(
    IndexedReplica,
    ReplicaUnderConstruction,
    InvalidatedBlock,
    ExcessReplica,
    CorruptReplica,
);

/// A replica location of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedReplica {
    /// Block id.
    pub block_id: i64,
    /// Storage holding the replica.
    pub storage_id: i32,
    /// Position of the replica within the block's location list.
    pub index: i32,
}

impl IndexedReplica {
    /// Creates a replica location.
    #[must_use]
    pub const fn new(block_id: i64, storage_id: i32, index: i32) -> Self {
        Self {
            block_id,
            storage_id,
            index,
        }
    }
}

impl Persistable for IndexedReplica {
    type Key = (i64, i32);
    const KIND: EntityKind = EntityKind::IndexedReplica;

    fn key(&self) -> (i64, i32) {
        (self.block_id, self.storage_id)
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("storage_id", self.storage_id)
            .with("index", self.index)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            storage_id: row.int32("storage_id")?,
            index: row.int32("index")?,
        })
    }
}

/// Datanode-side state of a replica being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    /// Finalized.
    Finalized,
    /// Being written.
    Rbw,
    /// Waiting to be recovered.
    Rwr,
    /// Under recovery.
    Rur,
    /// Temporary, for replication.
    Temporary,
}

impl ReplicaState {
    const fn code(self) -> i64 {
        match self {
            Self::Finalized => 0,
            Self::Rbw => 1,
            Self::Rwr => 2,
            Self::Rur => 3,
            Self::Temporary => 4,
        }
    }

    fn from_code(code: i64) -> StorageResult<Self> {
        match code {
            0 => Ok(Self::Finalized),
            1 => Ok(Self::Rbw),
            2 => Ok(Self::Rwr),
            3 => Ok(Self::Rur),
            4 => Ok(Self::Temporary),
            other => Err(StorageError::invalid_value("state", other)),
        }
    }
}

/// An expected replica of a block under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaUnderConstruction {
    /// Block id.
    pub block_id: i64,
    /// Storage expected to hold the replica.
    pub storage_id: i32,
    /// Reported replica state.
    pub state: ReplicaState,
    /// Position within the expected location list.
    pub index: i32,
}

impl ReplicaUnderConstruction {
    /// Creates a replica under construction.
    #[must_use]
    pub const fn new(block_id: i64, storage_id: i32, state: ReplicaState, index: i32) -> Self {
        Self {
            block_id,
            storage_id,
            state,
            index,
        }
    }
}

impl Persistable for ReplicaUnderConstruction {
    type Key = (i64, i32);
    const KIND: EntityKind = EntityKind::ReplicaUnderConstruction;

    fn key(&self) -> (i64, i32) {
        (self.block_id, self.storage_id)
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("storage_id", self.storage_id)
            .with("state", self.state.code())
            .with("replica_index", self.index)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            storage_id: row.int32("storage_id")?,
            state: ReplicaState::from_code(row.int("state")?)?,
            index: row.int32("replica_index")?,
        })
    }
}

/// A replica scheduled for deletion on a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidatedBlock {
    /// Block id.
    pub block_id: i64,
    /// Storage holding the replica.
    pub storage_id: i32,
    /// Generation stamp of the replica.
    pub generation_stamp: i64,
    /// Length of the replica.
    pub num_bytes: i64,
}

impl InvalidatedBlock {
    /// Creates an invalidation record.
    #[must_use]
    pub const fn new(block_id: i64, storage_id: i32, generation_stamp: i64, num_bytes: i64) -> Self {
        Self {
            block_id,
            storage_id,
            generation_stamp,
            num_bytes,
        }
    }
}

impl Persistable for InvalidatedBlock {
    type Key = (i64, i32);
    const KIND: EntityKind = EntityKind::InvalidatedBlock;

    fn key(&self) -> (i64, i32) {
        (self.block_id, self.storage_id)
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("storage_id", self.storage_id)
            .with("generation_stamp", self.generation_stamp)
            .with("num_bytes", self.num_bytes)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            storage_id: row.int32("storage_id")?,
            generation_stamp: row.int("generation_stamp")?,
            num_bytes: row.int("num_bytes")?,
        })
    }
}

/// A replica in excess of the replication target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcessReplica {
    /// Block id.
    pub block_id: i64,
    /// Storage holding the replica.
    pub storage_id: i32,
}

impl ExcessReplica {
    /// Creates an excess replica record.
    #[must_use]
    pub const fn new(block_id: i64, storage_id: i32) -> Self {
        Self {
            block_id,
            storage_id,
        }
    }
}

impl Persistable for ExcessReplica {
    type Key = (i64, i32);
    const KIND: EntityKind = EntityKind::ExcessReplica;

    fn key(&self) -> (i64, i32) {
        (self.block_id, self.storage_id)
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("storage_id", self.storage_id)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            storage_id: row.int32("storage_id")?,
        })
    }
}

/// A replica reported corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptReplica {
    /// Block id.
    pub block_id: i64,
    /// Storage holding the replica.
    pub storage_id: i32,
}

impl CorruptReplica {
    /// Creates a corrupt replica record.
    #[must_use]
    pub const fn new(block_id: i64, storage_id: i32) -> Self {
        Self {
            block_id,
            storage_id,
        }
    }
}

impl Persistable for CorruptReplica {
    type Key = (i64, i32);
    const KIND: EntityKind = EntityKind::CorruptReplica;

    fn key(&self) -> (i64, i32) {
        (self.block_id, self.storage_id)
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("block_id", self.block_id)
            .with("storage_id", self.storage_id)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            block_id: row.int("block_id")?,
            storage_id: row.int32("storage_id")?,
        })
    }
}
