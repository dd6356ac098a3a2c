//! Inode cache.

use super::{CacheCore, CachedEntity, Count, EntityContext, ListIndex, UniqueIndex};
use crate::error::CoreResult;
use nnmeta_storage::{DataAccess, INode, Session};
use std::sync::Arc;

/// Single-inode lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum INodeFinder {
    /// By inode id.
    ById(i64),
    /// A child of a directory by name.
    ByNameAndParentId {
        /// Local name.
        name: String,
        /// Parent inode id.
        parent_id: i64,
    },
}

/// Inode list lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum INodeListFinder {
    /// The children of a directory, ordered by name.
    ByParentId(i64),
    /// A batch of inodes, in the order of the ids given.
    ByIds(Vec<i64>),
}

impl CachedEntity for INode {
    type Finder = INodeFinder;
    type ListFinder = INodeListFinder;
    type Counter = Count;
    type Context = INodeContext;
}

fn name_key(inode: &INode) -> Option<(i64, String)> {
    Some((inode.parent_id, inode.name.clone()))
}

fn parent_id(inode: &INode) -> i64 {
    inode.parent_id
}

/// Inodes by id, by name within a parent, and by parent.
#[derive(Debug)]
pub struct INodeContext {
    core: CacheCore<INode>,
    by_name: UniqueIndex<INode, (i64, String)>,
    children: ListIndex<INode, i64>,
}

impl Default for INodeContext {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_name: UniqueIndex::new(name_key),
            children: ListIndex::new(parent_id),
        }
    }
}

impl EntityContext for INodeContext {
    type Entity = INode;

    fn core(&self) -> &CacheCore<INode> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<INode> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &INodeFinder,
    ) -> CoreResult<Option<Arc<INode>>> {
        match finder {
            INodeFinder::ById(id) => self.core.find_by_key(session, id),
            INodeFinder::ByNameAndParentId { name, parent_id } => self.by_name.find(
                &mut self.core,
                session,
                &(*parent_id, name.clone()),
                |access| access.find_by_name_and_parent_id(name, *parent_id),
            ),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &INodeListFinder,
    ) -> CoreResult<Vec<Arc<INode>>> {
        match finder {
            INodeListFinder::ByParentId(parent) => {
                let mut children = match self.children.get(&self.core, parent) {
                    Some(children) => children,
                    None => {
                        let parent = *parent;
                        let children = self.core.list_where(
                            session,
                            |i| i.parent_id == parent,
                            |access| access.find_by_parent_id(parent),
                        )?;
                        self.children.load(parent, &children);
                        children
                    }
                };
                children.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(children)
            }
            INodeListFinder::ByIds(ids) => self.find_by_ids(session, ids),
        }
    }

    fn index_insert(&mut self, inode: &INode, previous: Option<&INode>) {
        self.by_name.insert(inode, previous);
        self.children.insert(inode, previous);
    }

    fn index_remove(&mut self, inode: &INode) {
        self.by_name.remove(inode);
        self.children.remove(inode);
    }

    fn clear_indices(&mut self) {
        self.by_name.clear();
        self.children.clear();
    }
}

impl INodeContext {
    // One storage round trip for every id the cache cannot answer.
    fn find_by_ids(
        &mut self,
        session: &mut dyn Session,
        ids: &[i64],
    ) -> CoreResult<Vec<Arc<INode>>> {
        let missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| matches!(self.core.get(id), super::Cached::Miss))
            .collect();
        if !missing.is_empty() {
            let fetched = DataAccess::<INode>::new(session).find_by_ids(&missing)?;
            self.core.sync(fetched);
            for id in missing {
                self.core.mark_absent(id);
            }
        }
        Ok(ids
            .iter()
            .filter_map(|id| match self.core.get(id) {
                super::Cached::Hit(inode) => Some(inode),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{open, seed};
    use crate::error::CoreError;

    fn tree() -> Vec<INode> {
        vec![
            INode::directory(1, "", 0),
            INode::directory(2, "usr", 1),
            INode::file(3, "b.txt", 2, 3, 64 << 20),
            INode::file(4, "a.txt", 2, 3, 64 << 20),
        ]
    }

    #[test]
    fn lookup_paths_share_one_instance() {
        let (_db, mut session) = open();
        seed(session.as_mut(), &tree());
        let mut ctx = INodeContext::default();

        let by_id = ctx.find(session.as_mut(), &INodeFinder::ById(3)).unwrap().unwrap();
        let by_name = ctx
            .find(
                session.as_mut(),
                &INodeFinder::ByNameAndParentId {
                    name: "b.txt".into(),
                    parent_id: 2,
                },
            )
            .unwrap()
            .unwrap();
        let listed = ctx
            .find_list(session.as_mut(), &INodeListFinder::ByParentId(2))
            .unwrap();

        assert!(Arc::ptr_eq(&by_id, &by_name));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "a.txt");
        assert!(Arc::ptr_eq(&listed[1], &by_id));
    }

    #[test]
    fn rename_moves_between_indices() {
        let (db, mut session) = open();
        seed(session.as_mut(), &tree());
        let mut ctx = INodeContext::default();
        ctx.find_list(session.as_mut(), &INodeListFinder::ByParentId(2)).unwrap();
        ctx.find_list(session.as_mut(), &INodeListFinder::ByParentId(1)).unwrap();

        let mut moved = (*ctx.find(session.as_mut(), &INodeFinder::ById(4)).unwrap().unwrap()).clone();
        moved.name = "z.txt".into();
        moved.parent_id = 1;
        let moved = ctx.update(moved).unwrap();
        db.reset_stats();

        let old_name = INodeFinder::ByNameAndParentId {
            name: "a.txt".into(),
            parent_id: 2,
        };
        let new_name = INodeFinder::ByNameAndParentId {
            name: "z.txt".into(),
            parent_id: 1,
        };
        assert!(Arc::ptr_eq(
            &ctx.find(session.as_mut(), &new_name).unwrap().unwrap(),
            &moved
        ));
        let under_usr = ctx
            .find_list(session.as_mut(), &INodeListFinder::ByParentId(2))
            .unwrap();
        let under_root = ctx
            .find_list(session.as_mut(), &INodeListFinder::ByParentId(1))
            .unwrap();
        assert_eq!(under_usr.len(), 1);
        assert_eq!(under_root.len(), 2);
        assert_eq!(db.stats().round_trips(), 0);

        // storage still has the old name; the cached rename wins
        assert!(ctx.find(session.as_mut(), &old_name).unwrap().is_none());
    }

    #[test]
    fn removed_inode_is_invisible() {
        let (_db, mut session) = open();
        seed(session.as_mut(), &tree());
        let mut ctx = INodeContext::default();
        let file = ctx.find(session.as_mut(), &INodeFinder::ById(3)).unwrap().unwrap();
        ctx.remove(&file).unwrap();

        assert!(ctx.find(session.as_mut(), &INodeFinder::ById(3)).unwrap().is_none());
        let by_name = INodeFinder::ByNameAndParentId {
            name: "b.txt".into(),
            parent_id: 2,
        };
        assert!(ctx.find(session.as_mut(), &by_name).unwrap().is_none());
        let children = ctx
            .find_list(session.as_mut(), &INodeListFinder::ByParentId(2))
            .unwrap();
        assert_eq!(children.len(), 1);
        assert!(matches!(
            ctx.add(INode::file(3, "b.txt", 2, 1, 1)).unwrap_err(),
            CoreError::RemovedEntity { .. }
        ));
    }

    #[test]
    fn rename_onto_removed_name_stays_visible() {
        let (_db, mut session) = open();
        seed(
            session.as_mut(),
            &[
                INode::directory(1, "", 0),
                INode::directory(2, "a", 1),
                INode::directory(3, "b", 1),
            ],
        );
        let mut ctx = INodeContext::default();
        let old_holder = ctx.find(session.as_mut(), &INodeFinder::ById(2)).unwrap().unwrap();
        let mut renamed = (*ctx.find(session.as_mut(), &INodeFinder::ById(3)).unwrap().unwrap()).clone();
        renamed.name = "a".into();
        let renamed = ctx.update(renamed).unwrap();
        ctx.remove(&old_holder).unwrap();

        let found = ctx
            .find(
                session.as_mut(),
                &INodeFinder::ByNameAndParentId {
                    name: "a".into(),
                    parent_id: 1,
                },
            )
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&found, &renamed));
    }

    #[test]
    fn batch_lookup_keeps_order_and_skips_missing() {
        let (db, mut session) = open();
        seed(session.as_mut(), &tree());
        let mut ctx = INodeContext::default();
        let cached = ctx.find(session.as_mut(), &INodeFinder::ById(2)).unwrap().unwrap();
        db.reset_stats();

        let found = ctx
            .find_list(session.as_mut(), &INodeListFinder::ByIds(vec![4, 99, 2]))
            .unwrap();
        assert_eq!(found.iter().map(|i| i.id).collect::<Vec<_>>(), vec![4, 2]);
        assert!(Arc::ptr_eq(&found[1], &cached));
        assert!(db.stats().reads > 0);

        db.reset_stats();
        ctx.find_list(session.as_mut(), &INodeListFinder::ByIds(vec![4, 99, 2]))
            .unwrap();
        assert_eq!(db.stats().round_trips(), 0);
    }

    #[test]
    fn new_child_visible_in_loaded_listing() {
        let (_db, mut session) = open();
        seed(session.as_mut(), &tree());
        let mut ctx = INodeContext::default();
        ctx.find_list(session.as_mut(), &INodeListFinder::ByParentId(2)).unwrap();
        let added = ctx.add(INode::file(5, "0.txt", 2, 1, 1)).unwrap();

        let children = ctx
            .find_list(session.as_mut(), &INodeListFinder::ByParentId(2))
            .unwrap();
        assert_eq!(children.len(), 3);
        assert!(Arc::ptr_eq(&children[0], &added));
    }

    #[test]
    fn count_is_unsupported() {
        let (_db, mut session) = open();
        let mut ctx = INodeContext::default();
        let err = ctx.count(session.as_mut(), &Count::All).unwrap_err();
        assert!(matches!(err, CoreError::Unsupported { .. }));
    }
}
