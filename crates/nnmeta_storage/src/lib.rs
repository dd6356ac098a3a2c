//! # nnmeta Storage
//!
//! Metadata records and the storage backend contract for nnmeta.
//!
//! This crate is the lowest layer of the namenode metadata stack. It knows
//! how records map to rows and how rows reach a store, but nothing about
//! caching or transactions above a single backend session.
//!
//! ## Design Principles
//!
//! - Records are plain values; identity is the cache layer's business
//! - Sessions apply a whole transaction's writes as one batch
//! - Backends classify their own failures as transient or not
//! - The connection pool is constructed and closed explicitly
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nnmeta_storage::{DataAccess, Leader, MemoryConfig, MemoryDatabase};
//!
//! let db = Arc::new(MemoryDatabase::new());
//! let pool = db.pool(MemoryConfig::default()).unwrap();
//! let mut session = pool.obtain_session().unwrap();
//!
//! session.begin().unwrap();
//! let rows = [Leader::new(1, 1, 0, "nn1")];
//! DataAccess::<Leader>::new(session.as_mut())
//!     .prepare([], rows.iter(), [])
//!     .unwrap();
//! session.commit().unwrap();
//!
//! let found = DataAccess::<Leader>::new(session.as_mut()).find_by_key(&1).unwrap();
//! assert_eq!(found.map(|l| l.hostname), Some("nn1".to_string()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod backend;
mod entity;
mod error;
mod memory;
mod pool;
mod row;

pub use access::DataAccess;
pub use backend::{LockMode, RowBatch, Session, StorageConnector};
pub use entity::{
    encode_key, row_key, BlockInfo, BlockKey, BlockKeyType, BlockUcState, CorruptReplica, Counter,
    EntityKind, ExcessReplica, INode, IndexedReplica, InvalidatedBlock, Leader, Lease, LeasePath,
    PendingBlockInfo, Persistable, ReplicaRecord, ReplicaState, ReplicaUnderConstruction,
    UnderReplicatedBlock,
};
pub use error::{StorageError, StorageResult};
pub use memory::{
    FaultPoint, MemoryConfig, MemoryConnector, MemoryDatabase, MemorySession, MemoryStats,
    Snapshot,
};
pub use pool::ConnectorPool;
pub use row::{Row, Value};
