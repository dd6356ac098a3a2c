//! Benchmark utilities.

use nnmeta_testkit::{scenarios, TestCluster};
use rand::seq::SliceRandom;
use rand::Rng;

/// Creates a cluster holding `dirs` directories of `files` files each.
pub fn populated_cluster(dirs: i64, files: i64) -> TestCluster {
    let cluster = TestCluster::new();
    scenarios::populated_namespace(&cluster, dirs, files);
    cluster
}

/// Returns the directory ids created by [`populated_cluster`].
pub fn directory_ids(dirs: i64, files: i64) -> Vec<i64> {
    (0..dirs)
        .map(|d| scenarios::ROOT_ID + 1 + d * (files + 1))
        .collect()
}

/// Returns `count` ids drawn from `ids`, shuffled.
pub fn sample_ids(ids: &[i64], count: usize) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    let mut out: Vec<i64> = (0..count)
        .map(|_| ids[rng.gen_range(0..ids.len())])
        .collect();
    out.shuffle(&mut rng);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nnmeta_core::INodeFinder;
    use nnmeta_storage::INode;

    #[test]
    fn directory_ids_match_layout() {
        let cluster = populated_cluster(3, 2);
        let mut em = cluster.manager();
        for id in directory_ids(3, 2) {
            let inode = em.find::<INode>(&INodeFinder::ById(id)).unwrap().unwrap();
            assert!(inode.is_dir);
        }
    }

    #[test]
    fn samples_come_from_input() {
        let ids = [3, 5, 8];
        assert!(sample_ids(&ids, 20).iter().all(|id| ids.contains(id)));
    }
}
