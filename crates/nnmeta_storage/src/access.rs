//! Typed data access over a [`Session`].
//!
//! [`DataAccess`] turns row primitives into per-entity finder, counter and
//! batched-write operations. Every entity kind gets the generic operations;
//! the named finders below mirror the secondary indices of each table.

use crate::backend::{RowBatch, Session};
use crate::entity::{
    encode_key, BlockInfo, BlockKey, BlockKeyType, CorruptReplica, Counter, ExcessReplica, INode,
    IndexedReplica, InvalidatedBlock, Leader, Lease, LeasePath, PendingBlockInfo, Persistable,
    ReplicaRecord, ReplicaUnderConstruction, UnderReplicatedBlock,
};
use crate::error::StorageResult;
use std::collections::BTreeSet;
use std::marker::PhantomData;

/// Typed access to the table of entity `T`.
pub struct DataAccess<'s, T> {
    session: &'s mut dyn Session,
    _entity: PhantomData<fn() -> T>,
}

impl<'s, T: Persistable> DataAccess<'s, T> {
    /// Wraps a session.
    pub fn new(session: &'s mut dyn Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Finds one record by primary key.
    pub fn find_by_key(&mut self, key: &T::Key) -> StorageResult<Option<T>> {
        let key = encode_key(key)?;
        self.session
            .read(T::KIND, &key)?
            .map(|row| T::from_row(&row))
            .transpose()
    }

    /// Reads every record.
    pub fn find_all(&mut self) -> StorageResult<Vec<T>> {
        self.session
            .scan(T::KIND)?
            .iter()
            .map(T::from_row)
            .collect()
    }

    /// Reads every record matching `pred`.
    pub fn find_where(&mut self, pred: impl Fn(&T) -> bool) -> StorageResult<Vec<T>> {
        let mut out = self.find_all()?;
        out.retain(|e| pred(e));
        Ok(out)
    }

    /// Counts every record.
    pub fn count_all(&mut self) -> StorageResult<usize> {
        Ok(self.session.scan(T::KIND)?.len())
    }

    /// Counts records matching `pred`.
    pub fn count_where(&mut self, pred: impl Fn(&T) -> bool) -> StorageResult<usize> {
        Ok(self.find_where(pred)?.len())
    }

    /// Writes the accumulated changes of one transaction in a single batch.
    ///
    /// Deletes are applied before inserts, and inserts before updates.
    pub fn prepare<'a>(
        &mut self,
        removed: impl IntoIterator<Item = &'a T>,
        added: impl IntoIterator<Item = &'a T>,
        modified: impl IntoIterator<Item = &'a T>,
    ) -> StorageResult<()>
    where
        T: 'a,
    {
        let mut batch = RowBatch::default();
        for e in removed {
            batch.removed.push(encode_key(&e.key())?);
        }
        for e in added {
            batch.added.push((encode_key(&e.key())?, e.to_row()));
        }
        for e in modified {
            batch.modified.push((encode_key(&e.key())?, e.to_row()));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.session.apply(T::KIND, batch)
    }

    /// Deletes every record of the table.
    pub fn remove_all(&mut self) -> StorageResult<()> {
        self.session.truncate(T::KIND)
    }
}

impl DataAccess<'_, INode> {
    /// Finds a child by name.
    pub fn find_by_name_and_parent_id(
        &mut self,
        name: &str,
        parent_id: i64,
    ) -> StorageResult<Option<INode>> {
        Ok(self
            .find_where(|i| i.parent_id == parent_id && i.name == name)?
            .into_iter()
            .next())
    }

    /// Lists the children of a directory.
    pub fn find_by_parent_id(&mut self, parent_id: i64) -> StorageResult<Vec<INode>> {
        self.find_where(|i| i.parent_id == parent_id)
    }

    /// Reads a batch of inodes by id.
    pub fn find_by_ids(&mut self, ids: &[i64]) -> StorageResult<Vec<INode>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(inode) = self.find_by_key(id)? {
                out.push(inode);
            }
        }
        Ok(out)
    }
}

impl DataAccess<'_, BlockInfo> {
    /// Lists the blocks of a file.
    pub fn find_by_inode_id(&mut self, inode_id: i64) -> StorageResult<Vec<BlockInfo>> {
        self.find_where(|b| b.inode_id == inode_id)
    }

    /// Lists the blocks with a replica on a storage.
    pub fn find_by_storage_id(&mut self, storage_id: i32) -> StorageResult<Vec<BlockInfo>> {
        let block_ids: BTreeSet<i64> = DataAccess::<IndexedReplica>::new(&mut *self.session)
            .find_by_storage_id(storage_id)?
            .into_iter()
            .map(|r| r.block_id)
            .collect();
        self.find_where(|b| block_ids.contains(&b.block_id))
    }
}

macro_rules! replica_finders {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DataAccess<'_, $ty> {
                /// Lists the replicas of a block.
                pub fn find_by_block_id(&mut self, block_id: i64) -> StorageResult<Vec<$ty>> {
                    self.find_where(|r| r.block_id() == block_id)
                }

                /// Lists the replicas on a storage.
                pub fn find_by_storage_id(&mut self, storage_id: i32) -> StorageResult<Vec<$ty>> {
                    self.find_where(|r| r.storage_id() == storage_id)
                }

                /// Counts the replicas of a block.
                pub fn count_by_block_id(&mut self, block_id: i64) -> StorageResult<usize> {
                    self.count_where(|r| r.block_id() == block_id)
                }
            }
        )*
    };
}

replica_finders!(
    IndexedReplica,
    ReplicaUnderConstruction,
    InvalidatedBlock,
    ExcessReplica,
    CorruptReplica,
);

impl DataAccess<'_, UnderReplicatedBlock> {
    /// Lists queue entries at a level.
    pub fn find_by_level(&mut self, level: i32) -> StorageResult<Vec<UnderReplicatedBlock>> {
        self.find_where(|u| u.level == level)
    }

    /// Counts queue entries at a level.
    pub fn count_by_level(&mut self, level: i32) -> StorageResult<usize> {
        self.count_where(|u| u.level == level)
    }

    /// Counts queue entries below a level.
    pub fn count_less_than_level(&mut self, level: i32) -> StorageResult<usize> {
        self.count_where(|u| u.level < level)
    }
}

impl DataAccess<'_, PendingBlockInfo> {
    /// Lists pending work scheduled before `time_limit`.
    pub fn find_by_time_limit(&mut self, time_limit: i64) -> StorageResult<Vec<PendingBlockInfo>> {
        self.find_where(|p| p.time_stamp < time_limit)
    }
}

impl DataAccess<'_, Lease> {
    /// Finds a lease by holder id.
    pub fn find_by_holder_id(&mut self, holder_id: i32) -> StorageResult<Option<Lease>> {
        Ok(self
            .find_where(|l| l.holder_id == holder_id)?
            .into_iter()
            .next())
    }

    /// Lists leases last renewed before `time_limit`.
    pub fn find_by_time_limit(&mut self, time_limit: i64) -> StorageResult<Vec<Lease>> {
        self.find_where(|l| l.last_update < time_limit)
    }
}

impl DataAccess<'_, LeasePath> {
    /// Lists the paths held by a lease.
    pub fn find_by_holder_id(&mut self, holder_id: i32) -> StorageResult<Vec<LeasePath>> {
        self.find_where(|p| p.holder_id == holder_id)
    }

    /// Lists the paths starting with `prefix`.
    pub fn find_by_prefix(&mut self, prefix: &str) -> StorageResult<Vec<LeasePath>> {
        self.find_where(|p| p.path.starts_with(prefix))
    }
}

impl DataAccess<'_, BlockKey> {
    /// Finds the key with the given role.
    pub fn find_by_type(&mut self, key_type: BlockKeyType) -> StorageResult<Option<BlockKey>> {
        Ok(self
            .find_where(|k| k.key_type == key_type)?
            .into_iter()
            .next())
    }
}

impl DataAccess<'_, Leader> {
    /// Lists rows whose counter is strictly greater than `counter`.
    pub fn find_by_counter_gt(&mut self, counter: i64) -> StorageResult<Vec<Leader>> {
        self.find_where(|l| l.counter > counter)
    }

    /// Lists rows whose id is strictly less than `id`.
    pub fn find_by_id_lt(&mut self, id: i64) -> StorageResult<Vec<Leader>> {
        self.find_where(|l| l.id < id)
    }

    /// Counts rows with an id below `id`.
    pub fn count_predecessors(&mut self, id: i64) -> StorageResult<usize> {
        self.count_where(|l| l.id < id)
    }

    /// Counts rows with an id above `id`.
    pub fn count_successors(&mut self, id: i64) -> StorageResult<usize> {
        self.count_where(|l| l.id > id)
    }
}

impl DataAccess<'_, Counter> {
    /// Finds a counter by name.
    pub fn find_by_name(&mut self, name: &str) -> StorageResult<Option<Counter>> {
        Ok(self.find_where(|c| c.name == name)?.into_iter().next())
    }
}
