//! Block cache.

use super::{CacheCore, CachedEntity, Count, EntityContext, ListIndex};
use crate::error::CoreResult;
use nnmeta_storage::{BlockInfo, DataAccess, Session};
use std::sync::Arc;

/// Single-block lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFinder {
    /// By block id.
    ById(i64),
}

/// Block list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockListFinder {
    /// The blocks of a file, ordered by block index.
    ByInodeId(i64),
    /// The blocks with a replica on a storage.
    ByStorageId(i32),
    /// Every block.
    All,
}

impl CachedEntity for BlockInfo {
    type Finder = BlockFinder;
    type ListFinder = BlockListFinder;
    type Counter = Count;
    type Context = BlockContext;
}

fn inode_id(block: &BlockInfo) -> i64 {
    block.inode_id
}

/// Blocks by id and by owning inode.
#[derive(Debug)]
pub struct BlockContext {
    core: CacheCore<BlockInfo>,
    by_inode: ListIndex<BlockInfo, i64>,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_inode: ListIndex::new(inode_id),
        }
    }
}

impl EntityContext for BlockContext {
    type Entity = BlockInfo;

    fn core(&self) -> &CacheCore<BlockInfo> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<BlockInfo> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &BlockFinder,
    ) -> CoreResult<Option<Arc<BlockInfo>>> {
        match finder {
            BlockFinder::ById(id) => self.core.find_by_key(session, id),
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &BlockListFinder,
    ) -> CoreResult<Vec<Arc<BlockInfo>>> {
        match *finder {
            BlockListFinder::ByInodeId(inode) => {
                let mut blocks = match self.by_inode.get(&self.core, &inode) {
                    Some(blocks) => blocks,
                    None => {
                        let blocks = self.core.list_where(
                            session,
                            |b| b.inode_id == inode,
                            |access| access.find_by_inode_id(inode),
                        )?;
                        self.by_inode.load(inode, &blocks);
                        blocks
                    }
                };
                blocks.sort_by_key(|b| b.block_index);
                Ok(blocks)
            }
            BlockListFinder::ByStorageId(storage) => {
                // membership lives in the replica table, so this is never served from memory
                let fetched = DataAccess::<BlockInfo>::new(session).find_by_storage_id(storage)?;
                Ok(self.core.sync(fetched))
            }
            BlockListFinder::All => self.core.load_all(session),
        }
    }

    fn count(&mut self, session: &mut dyn Session, counter: &Count) -> CoreResult<usize> {
        match counter {
            Count::All => self
                .core
                .count_where(session, |_| true, |access| access.count_all()),
        }
    }

    fn index_insert(&mut self, block: &BlockInfo, previous: Option<&BlockInfo>) {
        self.by_inode.insert(block, previous);
    }

    fn index_remove(&mut self, block: &BlockInfo) {
        self.by_inode.remove(block);
    }

    fn clear_indices(&mut self) {
        self.by_inode.clear();
    }
}
