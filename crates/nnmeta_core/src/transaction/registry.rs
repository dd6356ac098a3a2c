//! Entity kind to cache factory table.

use crate::context::{CachedEntity, ErasedContext};
use crate::error::{CoreError, CoreResult};
use nnmeta_storage::{
    BlockInfo, BlockKey, CorruptReplica, Counter, EntityKind, ExcessReplica, INode,
    IndexedReplica, InvalidatedBlock, Leader, Lease, LeasePath, PendingBlockInfo,
    ReplicaUnderConstruction, UnderReplicatedBlock,
};
use std::collections::BTreeMap;
use std::fmt;

/// Creates an empty cache for one entity kind.
pub type ContextFactory = fn() -> Box<dyn ErasedContext>;

fn factory<T: CachedEntity>() -> Box<dyn ErasedContext> {
    Box::new(T::Context::default())
}

/// The entity kinds a transaction can cache, resolved once at startup.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    factories: BTreeMap<EntityKind, ContextFactory>,
}

impl ContextRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every metadata kind.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with::<INode>()
            .with::<BlockInfo>()
            .with::<IndexedReplica>()
            .with::<ReplicaUnderConstruction>()
            .with::<InvalidatedBlock>()
            .with::<ExcessReplica>()
            .with::<CorruptReplica>()
            .with::<UnderReplicatedBlock>()
            .with::<PendingBlockInfo>()
            .with::<Lease>()
            .with::<LeasePath>()
            .with::<BlockKey>()
            .with::<Leader>()
            .with::<Counter>()
    }

    /// Registers the cache of `T`.
    #[must_use]
    pub fn with<T: CachedEntity>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Registers the cache of `T`, replacing any earlier registration.
    pub fn register<T: CachedEntity>(&mut self) {
        self.factories.insert(T::KIND, factory::<T>);
    }

    /// Returns true if `kind` has a cache.
    #[must_use]
    pub fn contains(&self, kind: EntityKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Returns the registered kinds in commit order.
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.factories.keys().copied()
    }

    /// Returns the number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Creates an empty cache for `kind`.
    pub(crate) fn create(&self, kind: EntityKind) -> CoreResult<Box<dyn ErasedContext>> {
        self.factories
            .get(&kind)
            .map(|make| make())
            .ok_or(CoreError::UnknownEntity { kind })
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
