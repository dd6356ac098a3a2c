//! # nnmeta Core
//!
//! Transactional metadata caching for a namenode.
//!
//! This crate provides:
//! - Per-entity write-back caches with read-your-writes lookups
//! - Transaction contexts that flush every dirty cache in one batch
//! - The [`EntityManager`] API business logic is written against
//! - Retrying request handlers and the namesystem lock
//! - Leader election over the shared `Leader` table
//!
//! ## Design Principles
//!
//! - A cache instance never outlives its transaction
//! - Within a transaction, one key maps to one `Arc` instance
//! - Retry decisions depend only on [`ErrorKind`]
//! - Nothing is thread-local; each worker owns its manager
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nnmeta_core::{Config, INodeFinder, MetadataStore, OperationKind};
//! use nnmeta_storage::{INode, MemoryConfig, MemoryDatabase};
//!
//! let db = Arc::new(MemoryDatabase::new());
//! let store = MetadataStore::new(db.pool(MemoryConfig::default()).unwrap(), Config::default());
//! let mut em = store.entity_manager();
//!
//! store
//!     .transactional(OperationKind::Mkdirs)
//!     .handle(&mut em, |em| {
//!         let root = em.add(INode::directory(1, "", 0))?;
//!         let found = em.find::<INode>(&INodeFinder::ById(1))?.unwrap();
//!         assert!(Arc::ptr_eq(&root, &found));
//!         Ok(())
//!     })
//!     .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod context;
pub mod counters;
pub mod election;
mod error;
pub mod handler;
mod manager;
mod store;
pub mod transaction;
mod types;

pub use config::{Config, LeaderConfig};
pub use context::{
    BlockFinder, BlockKeyFinder, BlockKeyListFinder, BlockListFinder, CachedEntity, Count,
    CounterFinder, CounterListFinder, EntityContext, INodeFinder, INodeListFinder, LeaderCounter,
    LeaderFinder, LeaderListFinder, LeaseFinder, LeaseListFinder, LeasePathFinder,
    LeasePathListFinder, PendingBlockListFinder, QueueFinder, ReplicaCounter, ReplicaFinder,
    ReplicaListFinder, UnderReplicatedCounter, UnderReplicatedListFinder,
};
pub use counters::CounterId;
pub use election::{LeaderElection, NamenodeRole, LEADER_INITIALIZATION_ID};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use handler::{
    LightWeightRequestHandler, LockKind, Namesystem, NamesystemLock, OperationKind,
    TransactionalRequestHandler,
};
pub use manager::EntityManager;
pub use store::MetadataStore;
pub use transaction::{ContextRegistry, TransactionContext, TransactionState};
pub use types::{PendingWrites, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
