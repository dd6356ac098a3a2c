//! Block token key cache.

use super::{CacheCore, CachedEntity, Count, EntityContext, UniqueIndex};
use crate::error::{CoreError, CoreResult};
use nnmeta_storage::{BlockKey, BlockKeyType, Session};
use std::sync::Arc;

/// Single-key lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKeyFinder {
    /// By key id.
    ById(i32),
    /// The current or the next key.
    ByType(BlockKeyType),
}

/// Key list lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKeyListFinder {
    /// Every key.
    All,
}

impl CachedEntity for BlockKey {
    type Finder = BlockKeyFinder;
    type ListFinder = BlockKeyListFinder;
    type Counter = Count;
    type Context = BlockKeyContext;
}

// Only the current and next keys are unique by role.
fn role(key: &BlockKey) -> Option<BlockKeyType> {
    match key.key_type {
        BlockKeyType::Current | BlockKeyType::Next => Some(key.key_type),
        BlockKeyType::Simple => None,
    }
}

/// Block keys by id and by role.
#[derive(Debug)]
pub struct BlockKeyContext {
    core: CacheCore<BlockKey>,
    by_role: UniqueIndex<BlockKey, BlockKeyType>,
}

impl Default for BlockKeyContext {
    fn default() -> Self {
        Self {
            core: CacheCore::default(),
            by_role: UniqueIndex::new(role),
        }
    }
}

impl EntityContext for BlockKeyContext {
    type Entity = BlockKey;

    fn core(&self) -> &CacheCore<BlockKey> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CacheCore<BlockKey> {
        &mut self.core
    }

    fn find(
        &mut self,
        session: &mut dyn Session,
        finder: &BlockKeyFinder,
    ) -> CoreResult<Option<Arc<BlockKey>>> {
        match *finder {
            BlockKeyFinder::ById(id) => self.core.find_by_key(session, &id),
            BlockKeyFinder::ByType(BlockKeyType::Simple) => Err(CoreError::invalid_operation(
                "simple block keys have no unique role",
            )),
            BlockKeyFinder::ByType(key_type) => {
                self.by_role.find(&mut self.core, session, &key_type, |access| {
                    access.find_by_type(key_type)
                })
            }
        }
    }

    fn find_list(
        &mut self,
        session: &mut dyn Session,
        finder: &BlockKeyListFinder,
    ) -> CoreResult<Vec<Arc<BlockKey>>> {
        match finder {
            BlockKeyListFinder::All => self.core.load_all(session),
        }
    }

    fn remove_all(&mut self, session: &mut dyn Session) -> CoreResult<()> {
        self.clear_indices();
        self.core.truncate(session)
    }

    fn index_insert(&mut self, key: &BlockKey, previous: Option<&BlockKey>) {
        self.by_role.insert(key, previous);
    }

    fn index_remove(&mut self, key: &BlockKey) {
        self.by_role.remove(key);
    }

    fn clear_indices(&mut self) {
        self.by_role.clear();
    }
}
