//! The inode cache against a map model, one transaction per sequence.

use nnmeta_core::{CoreError, INodeFinder, INodeListFinder};
use nnmeta_storage::INode;
use nnmeta_testkit::{cache_operation_sequence, CacheOperation, PropTestConfig, TestCluster};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const BASELINE: i64 = 5;

fn baseline(cluster: &TestCluster) -> BTreeMap<i64, INode> {
    let mut em = cluster.manager();
    em.begin().unwrap();
    let mut model = BTreeMap::new();
    for id in 1..=BASELINE {
        let inode = INode::directory(id, format!("n{id}"), id % 3);
        em.add(inode.clone()).unwrap();
        model.insert(id, inode);
    }
    em.commit().unwrap();
    model
}

fn names_under(model: &BTreeMap<i64, INode>, parent_id: i64) -> Vec<String> {
    let mut names: Vec<String> = model
        .values()
        .filter(|inode| inode.parent_id == parent_id)
        .map(|inode| inode.name.clone())
        .collect();
    names.sort();
    names
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn cache_matches_model(ops in cache_operation_sequence(1, 40)) {
        let cluster = TestCluster::new();
        let mut model = baseline(&cluster);
        let committed: BTreeSet<i64> = model.keys().copied().collect();
        let mut removed = BTreeSet::new();

        let mut em = cluster.manager();
        em.begin().unwrap();
        for op in ops {
            match op {
                CacheOperation::Add { id, parent_id } => {
                    if model.contains_key(&id) {
                        continue;
                    }
                    let inode = INode::directory(id, format!("n{id}"), parent_id);
                    let result = em.add(inode.clone());
                    if removed.contains(&id) {
                        prop_assert!(matches!(result, Err(CoreError::RemovedEntity { .. })), "expected RemovedEntity error");
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(id, inode);
                    }
                }
                CacheOperation::Update { id, name } => {
                    let Some(current) = em.find::<INode>(&INodeFinder::ById(id)).unwrap() else {
                        prop_assert!(!model.contains_key(&id));
                        continue;
                    };
                    let mut renamed = INode::clone(&current);
                    renamed.name = format!("{name}-{id}");
                    em.update(renamed.clone()).unwrap();
                    model.insert(id, renamed);
                }
                CacheOperation::Remove { id } => {
                    match em.find::<INode>(&INodeFinder::ById(id)).unwrap() {
                        Some(current) => {
                            em.remove(&*current).unwrap();
                            model.remove(&id);
                            if committed.contains(&id) {
                                removed.insert(id);
                            }
                        }
                        None => {
                            let stray = INode::directory(id, "stray", 0);
                            let result = em.remove(&stray);
                            prop_assert!(matches!(result, Err(CoreError::UntrackedEntity { .. })), "expected UntrackedEntity error");
                        }
                    }
                }
                CacheOperation::Find { id } => {
                    let found = em.find::<INode>(&INodeFinder::ById(id)).unwrap();
                    prop_assert_eq!(found.as_deref(), model.get(&id));
                }
                CacheOperation::List { parent_id } => {
                    let listed = em
                        .find_list::<INode>(&INodeListFinder::ByParentId(parent_id))
                        .unwrap();
                    let names: Vec<String> = listed.iter().map(|inode| inode.name.clone()).collect();
                    prop_assert_eq!(names, names_under(&model, parent_id));
                }
            }
        }
        em.commit().unwrap();

        let mut reader = cluster.manager();
        for id in 1..12 {
            let stored = reader.find::<INode>(&INodeFinder::ById(id)).unwrap();
            prop_assert_eq!(stored.as_deref(), model.get(&id));
        }
    }
}
