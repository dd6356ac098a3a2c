//! Cross-crate integration test helpers.
//!
//! Checks that the entity manager, the transaction context and the storage
//! layer agree on what a transaction can see and what it writes.

use crate::fixtures::TestCluster;
use nnmeta_core::{CoreError, EntityManager, INodeFinder, INodeListFinder, OperationKind};
use nnmeta_storage::INode;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A test harness that mirrors committed inodes in a model.
pub struct IntegrationHarness {
    /// The cluster under test.
    pub cluster: TestCluster,
    em: EntityManager,
    inodes: BTreeMap<i64, INode>,
}

impl IntegrationHarness {
    /// Creates a harness over a fresh cluster.
    pub fn new() -> Self {
        let cluster = TestCluster::new();
        Self {
            em: cluster.manager(),
            cluster,
            inodes: BTreeMap::new(),
        }
    }

    /// Adds a directory and tracks it.
    pub fn mkdir(&mut self, id: i64, name: &str, parent_id: i64) {
        let inode = INode::directory(id, name, parent_id);
        self.cluster
            .store
            .transactional(OperationKind::Mkdirs)
            .handle(&mut self.em, |em| em.add(inode.clone()).map(drop))
            .expect("Failed to add inode");
        self.inodes.insert(id, inode);
    }

    /// Renames a tracked inode.
    pub fn rename(&mut self, id: i64, name: &str) {
        let renamed = self
            .cluster
            .store
            .transactional(OperationKind::Rename)
            .handle(&mut self.em, |em| {
                let current = em
                    .find::<INode>(&INodeFinder::ById(id))?
                    .ok_or_else(|| CoreError::domain(format!("inode {id} not found")))?;
                let mut renamed = INode::clone(&current);
                renamed.name = name.to_string();
                em.update(renamed.clone())?;
                Ok(renamed)
            })
            .expect("Failed to rename inode");
        self.inodes.insert(id, renamed);
    }

    /// Deletes a tracked inode.
    pub fn delete(&mut self, id: i64) {
        self.cluster
            .store
            .transactional(OperationKind::Delete)
            .handle(&mut self.em, |em| match em.find::<INode>(&INodeFinder::ById(id))? {
                Some(inode) => em.remove(&*inode),
                None => Ok(()),
            })
            .expect("Failed to delete inode");
        self.inodes.remove(&id);
    }

    /// Reads an inode and checks it against the model.
    pub fn get_and_verify(&mut self, id: i64) -> Option<Arc<INode>> {
        let actual = self
            .em
            .find::<INode>(&INodeFinder::ById(id))
            .expect("Failed to find inode");
        assert_eq!(
            actual.as_deref(),
            self.inodes.get(&id),
            "inode {id} differs from model"
        );
        actual
    }

    /// Checks every tracked inode and every listed directory.
    pub fn verify_all(&mut self) {
        let ids: Vec<i64> = self.inodes.keys().copied().collect();
        for id in ids {
            self.get_and_verify(id);
        }

        let mut children: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
        for inode in self.inodes.values() {
            children
                .entry(inode.parent_id)
                .or_default()
                .push(inode.name.as_str());
        }
        for (parent, mut expected) in children {
            expected.sort_unstable();
            let listed = self
                .em
                .find_list::<INode>(&INodeListFinder::ByParentId(parent))
                .expect("Failed to list directory");
            let names: Vec<&str> = listed.iter().map(|inode| inode.name.as_str()).collect();
            assert_eq!(names, expected, "listing of {parent} differs from model");
        }
    }

    /// Returns the count of tracked inodes.
    pub fn tracked_count(&self) -> usize {
        self.inodes.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Visibility checks.
pub mod visibility {
    use super::*;

    /// A transaction sees its own buffered writes in point and list
    /// lookups.
    pub fn check_read_your_writes(cluster: &TestCluster) {
        let mut em = cluster.manager();
        em.begin().expect("Failed to begin");
        em.add(INode::directory(10, "a", 1)).expect("Failed to add");

        let found = em
            .find::<INode>(&INodeFinder::ById(10))
            .expect("Failed to find");
        assert_eq!(found.map(|inode| inode.name.clone()), Some("a".to_string()));

        let by_name = em
            .find::<INode>(&INodeFinder::ByNameAndParentId {
                name: "a".into(),
                parent_id: 1,
            })
            .expect("Failed to find by name");
        assert!(by_name.is_some(), "name index must see the pending add");

        let listed = em
            .find_list::<INode>(&INodeListFinder::ByParentId(1))
            .expect("Failed to list");
        assert_eq!(listed.len(), 1);
        em.rollback().expect("Failed to roll back");
    }

    /// Nothing a transaction buffers is visible to others before commit.
    pub fn check_uncommitted_invisible(cluster: &TestCluster) {
        let mut writer = cluster.manager();
        let mut reader = cluster.manager();

        writer.begin().expect("Failed to begin");
        writer
            .add(INode::directory(20, "pending", 1))
            .expect("Failed to add");

        let seen = reader
            .find::<INode>(&INodeFinder::ById(20))
            .expect("Failed to find");
        assert!(seen.is_none(), "uncommitted inode leaked");

        writer.commit().expect("Failed to commit");
        let seen = reader
            .find::<INode>(&INodeFinder::ById(20))
            .expect("Failed to find");
        assert!(seen.is_some(), "committed inode not visible");
    }

    /// A removed entity disappears from lookups in the same transaction.
    pub fn check_removed_invisible(cluster: &TestCluster) {
        let mut em = cluster.manager();
        em.add(INode::directory(30, "doomed", 1))
            .expect("Failed to add");

        em.begin().expect("Failed to begin");
        let inode = em
            .find::<INode>(&INodeFinder::ById(30))
            .expect("Failed to find")
            .expect("Inode missing");
        em.remove(&*inode).expect("Failed to remove");

        assert!(em
            .find::<INode>(&INodeFinder::ById(30))
            .expect("Failed to find")
            .is_none());
        let listed = em
            .find_list::<INode>(&INodeListFinder::ByParentId(1))
            .expect("Failed to list");
        assert!(listed.iter().all(|inode| inode.id != 30));
        em.commit().expect("Failed to commit");
    }
}

/// Transaction lifecycle checks.
pub mod lifecycle {
    use super::*;
    use nnmeta_storage::{BlockInfo, EntityKind};

    /// A rolled back transaction leaves storage untouched.
    pub fn check_rollback_discards(cluster: &TestCluster) {
        let before = cluster.rows(EntityKind::INode);
        let mut em = cluster.manager();
        let result = cluster
            .store
            .transactional(OperationKind::Mkdirs)
            .handle(&mut em, |em| {
                em.add(INode::directory(40, "aborted", 1))?;
                Err::<(), _>(CoreError::invalid_operation("Simulated abort"))
            });
        assert!(result.is_err());
        assert_eq!(cluster.rows(EntityKind::INode), before);
    }

    /// Every lookup of one key within a transaction yields the same `Arc`.
    pub fn check_reference_stability(cluster: &TestCluster) {
        let mut em = cluster.manager();
        em.add(INode::directory(50, "stable", 1))
            .expect("Failed to add");

        em.begin().expect("Failed to begin");
        let by_id = em
            .find::<INode>(&INodeFinder::ById(50))
            .expect("Failed to find")
            .expect("Inode missing");
        let by_name = em
            .find::<INode>(&INodeFinder::ByNameAndParentId {
                name: "stable".into(),
                parent_id: 1,
            })
            .expect("Failed to find")
            .expect("Inode missing");
        let listed = em
            .find_list::<INode>(&INodeListFinder::ByParentId(1))
            .expect("Failed to list");
        assert!(Arc::ptr_eq(&by_id, &by_name));
        assert!(listed.iter().any(|inode| Arc::ptr_eq(inode, &by_id)));
        em.commit().expect("Failed to commit");
    }

    /// A commit applies one batch per dirty entity kind.
    pub fn check_commit_batches_once(cluster: &TestCluster) {
        cluster.db.reset_stats();
        let mut em = cluster.manager();
        cluster
            .store
            .transactional(OperationKind::StartFile)
            .handle(&mut em, |em| {
                for id in 100..110 {
                    em.add(INode::file(id, format!("f{id}"), 1, 3, 64 << 20))?;
                    em.add(BlockInfo::new(id, id, 0))?;
                }
                Ok(())
            })
            .expect("Failed to commit");

        let stats = cluster.db.stats();
        assert_eq!(stats.batches_for(EntityKind::INode), 1);
        assert_eq!(stats.batches_for(EntityKind::BlockInfo), 1);
        assert_eq!(stats.batches_for(EntityKind::Lease), 0);
        assert_eq!(stats.commits, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_tracks_model() {
        let mut harness = IntegrationHarness::new();
        harness.mkdir(1, "", 0);
        harness.mkdir(2, "b", 1);
        harness.mkdir(3, "a", 1);
        harness.rename(2, "c");
        harness.delete(3);
        assert_eq!(harness.tracked_count(), 2);

        assert!(harness.get_and_verify(3).is_none());
        harness.verify_all();
    }

    #[test]
    fn visibility_checks() {
        let cluster = TestCluster::new();
        visibility::check_read_your_writes(&cluster);
        visibility::check_uncommitted_invisible(&cluster);
        visibility::check_removed_invisible(&cluster);
    }

    #[test]
    fn lifecycle_checks() {
        let cluster = TestCluster::new();
        lifecycle::check_rollback_discards(&cluster);
        lifecycle::check_reference_stability(&cluster);
        lifecycle::check_commit_batches_once(&cluster);
    }
}
