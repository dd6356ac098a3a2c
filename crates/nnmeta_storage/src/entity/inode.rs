//! Namespace inode record.

use super::{EntityKind, Persistable};
use crate::error::StorageResult;
use crate::row::Row;
use serde::{Deserialize, Serialize};

const BLOCK_SIZE_BITS: u32 = 48;
const BLOCK_SIZE_MASK: i64 = (1 << BLOCK_SIZE_BITS) - 1;

/// A file, directory or symlink in the namespace.
///
/// Directories with quota and files under construction share this one record;
/// the variant-specific columns are simply unused for the other variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct INode {
    /// Inode id.
    pub id: i64,
    /// Local name within the parent directory.
    pub name: String,
    /// Parent inode id.
    pub parent_id: i64,
    /// True for directories.
    pub is_dir: bool,
    /// Last modification time in milliseconds.
    pub modification_time: i64,
    /// Last access time in milliseconds.
    pub access_time: i64,
    /// Serialized permission status.
    pub permission: Vec<u8>,
    /// Namespace quota (directories with quota).
    pub nsquota: i64,
    /// Diskspace quota (directories with quota).
    pub dsquota: i64,
    /// Namespace usage (directories with quota).
    pub nscount: i64,
    /// Diskspace usage (directories with quota).
    pub dscount: i64,
    /// True if the directory carries a quota.
    pub is_dir_with_quota: bool,
    /// True if the file is being written.
    pub is_under_construction: bool,
    /// Writer's client name.
    pub client_name: Option<String>,
    /// Writer's client machine.
    pub client_machine: Option<String>,
    /// Writer's datanode, if the client runs on one.
    pub client_node: Option<String>,
    /// Replication factor and preferred block size packed together.
    pub header: i64,
    /// Symlink target.
    pub symlink: Option<String>,
}

impl INode {
    /// Creates a directory inode.
    #[must_use]
    pub fn directory(id: i64, name: impl Into<String>, parent_id: i64) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            is_dir: true,
            modification_time: 0,
            access_time: 0,
            permission: Vec::new(),
            nsquota: -1,
            dsquota: -1,
            nscount: 0,
            dscount: 0,
            is_dir_with_quota: false,
            is_under_construction: false,
            client_name: None,
            client_machine: None,
            client_node: None,
            header: 0,
            symlink: None,
        }
    }

    /// Creates a file inode.
    #[must_use]
    pub fn file(
        id: i64,
        name: impl Into<String>,
        parent_id: i64,
        replication: u16,
        preferred_block_size: i64,
    ) -> Self {
        let mut inode = Self::directory(id, name, parent_id);
        inode.is_dir = false;
        inode.header = Self::pack_header(replication, preferred_block_size);
        inode
    }

    /// Creates a symlink inode.
    #[must_use]
    pub fn symlink(id: i64, name: impl Into<String>, parent_id: i64, target: impl Into<String>) -> Self {
        let mut inode = Self::directory(id, name, parent_id);
        inode.is_dir = false;
        inode.symlink = Some(target.into());
        inode
    }

    /// Packs replication and block size into a header value.
    #[must_use]
    pub const fn pack_header(replication: u16, preferred_block_size: i64) -> i64 {
        ((replication as i64) << BLOCK_SIZE_BITS) | (preferred_block_size & BLOCK_SIZE_MASK)
    }

    /// Returns the replication factor.
    #[must_use]
    pub const fn replication(&self) -> u16 {
        ((self.header >> BLOCK_SIZE_BITS) & 0xFFFF) as u16
    }

    /// Returns the preferred block size.
    #[must_use]
    pub const fn preferred_block_size(&self) -> i64 {
        self.header & BLOCK_SIZE_MASK
    }

    /// Returns true for symlinks.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.symlink.is_some()
    }
}

impl Persistable for INode {
    type Key = i64;
    const KIND: EntityKind = EntityKind::INode;

    fn key(&self) -> i64 {
        self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("parent_id", self.parent_id)
            .with("is_dir", self.is_dir)
            .with("modification_time", self.modification_time)
            .with("access_time", self.access_time)
            .with("permission", self.permission.clone())
            .with("nsquota", self.nsquota)
            .with("dsquota", self.dsquota)
            .with("nscount", self.nscount)
            .with("dscount", self.dscount)
            .with("is_dir_with_quota", self.is_dir_with_quota)
            .with("is_under_construction", self.is_under_construction)
            .with("client_name", self.client_name.clone())
            .with("client_machine", self.client_machine.clone())
            .with("client_node", self.client_node.clone())
            .with("header", self.header)
            .with("symlink", self.symlink.clone())
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            id: row.int("id")?,
            name: row.text("name")?,
            parent_id: row.int("parent_id")?,
            is_dir: row.bool("is_dir")?,
            modification_time: row.int("modification_time")?,
            access_time: row.int("access_time")?,
            permission: row.bytes("permission")?,
            nsquota: row.int("nsquota")?,
            dsquota: row.int("dsquota")?,
            nscount: row.int("nscount")?,
            dscount: row.int("dscount")?,
            is_dir_with_quota: row.bool("is_dir_with_quota")?,
            is_under_construction: row.bool("is_under_construction")?,
            client_name: row.opt_text("client_name")?,
            client_machine: row.opt_text("client_machine")?,
            client_node: row.opt_text("client_node")?,
            header: row.int("header")?,
            symlink: row.opt_text("symlink")?,
        })
    }
}
