//! Property-based test generators using proptest.
//!
//! Provides strategies for metadata records and for operation sequences
//! that drive a transaction cache against a simple model.

use nnmeta_storage::{BlockInfo, INode, Leader, LeasePath};
use proptest::prelude::*;

/// Strategy for path component names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for directory and file inodes under a small set of parents.
pub fn inode_strategy() -> impl Strategy<Value = INode> {
    (1i64..64, name_strategy(), 0i64..4, any::<bool>(), 1u16..4).prop_map(
        |(id, name, parent_id, is_dir, replication)| {
            if is_dir {
                INode::directory(id, name, parent_id)
            } else {
                INode::file(id, name, parent_id, replication, 64 << 20)
            }
        },
    )
}

/// Strategy for blocks of a few inodes.
pub fn block_strategy() -> impl Strategy<Value = BlockInfo> {
    (1i64..256, 1i64..8, 0i32..16, 0i64..1 << 30).prop_map(|(block_id, inode_id, index, bytes)| {
        let mut block = BlockInfo::new(block_id, inode_id, index);
        block.num_bytes = bytes;
        block
    })
}

/// Strategy for lease paths of a few holders.
pub fn lease_path_strategy() -> impl Strategy<Value = LeasePath> {
    (prop::collection::vec(name_strategy(), 1..4), 1i32..5)
        .prop_map(|(parts, holder)| LeasePath::new(format!("/{}", parts.join("/")), holder))
}

/// Strategy for a Leader table: unique ids from 1, arbitrary counters.
pub fn leader_table_strategy(max_namenodes: usize) -> impl Strategy<Value = Vec<Leader>> {
    prop::collection::vec(0i64..10_000, 0..=max_namenodes).prop_map(|counters| {
        counters
            .into_iter()
            .enumerate()
            .map(|(i, counter)| {
                let id = i as i64 + 1;
                Leader::new(id, counter, 0, format!("nn{id}"))
            })
            .collect()
    })
}

/// One step of a cache operation sequence.
#[derive(Debug, Clone)]
pub enum CacheOperation {
    /// Add a directory inode.
    Add {
        /// Inode id.
        id: i64,
        /// Parent id.
        parent_id: i64,
    },
    /// Rename an inode in place.
    Update {
        /// Inode id.
        id: i64,
        /// New name.
        name: String,
    },
    /// Remove an inode.
    Remove {
        /// Inode id.
        id: i64,
    },
    /// Look an inode up by id.
    Find {
        /// Inode id.
        id: i64,
    },
    /// List the children of a parent.
    List {
        /// Parent id.
        parent_id: i64,
    },
}

/// Strategy for one cache operation over a small key space.
pub fn cache_operation_strategy() -> impl Strategy<Value = CacheOperation> {
    let id = 1i64..12;
    let parent = 0i64..3;
    prop_oneof![
        3 => (id.clone(), parent.clone())
            .prop_map(|(id, parent_id)| CacheOperation::Add { id, parent_id }),
        2 => (id.clone(), name_strategy()).prop_map(|(id, name)| CacheOperation::Update { id, name }),
        2 => id.clone().prop_map(|id| CacheOperation::Remove { id }),
        2 => id.prop_map(|id| CacheOperation::Find { id }),
        1 => parent.prop_map(|parent_id| CacheOperation::List { parent_id }),
    ]
}

/// Strategy for a sequence of cache operations.
pub fn cache_operation_sequence(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<CacheOperation>> {
    prop::collection::vec(cache_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
