//! Metadata records persisted by the namenode.
//!
//! Every record is a plain value with a primary key and a column mapping.
//! Identity and caching are layered on top by the transaction machinery.

mod block;
mod block_key;
mod inode;
mod lease;
mod leader;
mod queue;
mod replica;

pub use block::{BlockInfo, BlockUcState};
pub use block_key::{BlockKey, BlockKeyType};
pub use inode::INode;
pub use lease::{Lease, LeasePath};
pub use leader::{Counter, Leader};
pub use queue::{PendingBlockInfo, UnderReplicatedBlock};
pub use replica::{
    CorruptReplica, ExcessReplica, IndexedReplica, InvalidatedBlock, ReplicaRecord, ReplicaState,
    ReplicaUnderConstruction,
};

use crate::error::{StorageError, StorageResult};
use crate::row::Row;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// Identifies an entity type (and its table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Namespace inodes.
    INode,
    /// Blocks.
    BlockInfo,
    /// Replica locations (triplets).
    IndexedReplica,
    /// Replicas of blocks under construction.
    ReplicaUnderConstruction,
    /// Replicas scheduled for deletion on a storage.
    InvalidatedBlock,
    /// Replicas in excess of the replication target.
    ExcessReplica,
    /// Replicas reported corrupt.
    CorruptReplica,
    /// Replication queue entries.
    UnderReplicatedBlock,
    /// In-flight replication bookkeeping.
    PendingBlock,
    /// Client leases.
    Lease,
    /// Paths held by leases.
    LeasePath,
    /// Block token signing keys.
    BlockKey,
    /// Leader election rows.
    Leader,
    /// Named counters.
    Counter,
}

impl EntityKind {
    /// All entity kinds in table order.
    pub const ALL: [EntityKind; 14] = [
        EntityKind::INode,
        EntityKind::BlockInfo,
        EntityKind::IndexedReplica,
        EntityKind::ReplicaUnderConstruction,
        EntityKind::InvalidatedBlock,
        EntityKind::ExcessReplica,
        EntityKind::CorruptReplica,
        EntityKind::UnderReplicatedBlock,
        EntityKind::PendingBlock,
        EntityKind::Lease,
        EntityKind::LeasePath,
        EntityKind::BlockKey,
        EntityKind::Leader,
        EntityKind::Counter,
    ];

    /// Returns the physical table name.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::INode => "inodes",
            Self::BlockInfo => "block_infos",
            Self::IndexedReplica => "triplets",
            Self::ReplicaUnderConstruction => "replica_under_constructions",
            Self::InvalidatedBlock => "invalidated_blocks",
            Self::ExcessReplica => "excess_replicas",
            Self::CorruptReplica => "corrupt_replicas",
            Self::UnderReplicatedBlock => "under_replicated_blocks",
            Self::PendingBlock => "pending_blocks",
            Self::Lease => "leases",
            Self::LeasePath => "lease_paths",
            Self::BlockKey => "block_keys",
            Self::Leader => "leader",
            Self::Counter => "counters",
        }
    }

    /// Looks up a kind by its table name.
    #[must_use]
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.table_name() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A record that can be stored as a [`Row`].
///
/// `from_row(&e.to_row()) == e` must hold for every value, and
/// `from_row(r)?.to_row() == r` for every row the entity produces.
pub trait Persistable: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Primary key type.
    type Key: Clone + Ord + Hash + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The entity kind (and table) of this record.
    const KIND: EntityKind;

    /// Returns the primary key.
    fn key(&self) -> Self::Key;

    /// Converts the record to a row.
    fn to_row(&self) -> Row;

    /// Builds the record from a row.
    fn from_row(row: &Row) -> StorageResult<Self>;
}

/// Encodes a primary key into its canonical byte form.
pub fn encode_key<K: Serialize>(key: &K) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(key, &mut buf).map_err(|e| StorageError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Derives the encoded primary key of a row of the given kind.
pub fn row_key(kind: EntityKind, row: &Row) -> StorageResult<Vec<u8>> {
    fn key_of<T: Persistable>(row: &Row) -> StorageResult<Vec<u8>> {
        encode_key(&T::from_row(row)?.key())
    }

    match kind {
        EntityKind::INode => key_of::<INode>(row),
        EntityKind::BlockInfo => key_of::<BlockInfo>(row),
        EntityKind::IndexedReplica => key_of::<IndexedReplica>(row),
        EntityKind::ReplicaUnderConstruction => key_of::<ReplicaUnderConstruction>(row),
        EntityKind::InvalidatedBlock => key_of::<InvalidatedBlock>(row),
        EntityKind::ExcessReplica => key_of::<ExcessReplica>(row),
        EntityKind::CorruptReplica => key_of::<CorruptReplica>(row),
        EntityKind::UnderReplicatedBlock => key_of::<UnderReplicatedBlock>(row),
        EntityKind::PendingBlock => key_of::<PendingBlockInfo>(row),
        EntityKind::Lease => key_of::<Lease>(row),
        EntityKind::LeasePath => key_of::<LeasePath>(row),
        EntityKind::BlockKey => key_of::<BlockKey>(row),
        EntityKind::Leader => key_of::<Leader>(row),
        EntityKind::Counter => key_of::<Counter>(row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_unique_and_resolvable() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_table_name(kind.table_name()), Some(kind));
        }
        assert_eq!(EntityKind::from_table_name("nope"), None);
    }

    #[test]
    fn encoded_keys_distinguish_values() {
        let a = encode_key(&(1_i64, 2_i32)).unwrap();
        let b = encode_key(&(1_i64, 3_i32)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, encode_key(&(1_i64, 2_i32)).unwrap());
    }

    #[test]
    fn row_key_matches_entity_key() {
        let leader = Leader::new(4, 10, 99, "nn4");
        let expected = encode_key(&4_i64).unwrap();
        assert_eq!(row_key(EntityKind::Leader, &leader.to_row()).unwrap(), expected);
    }
}
