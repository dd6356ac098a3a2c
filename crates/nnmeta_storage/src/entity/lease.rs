//! Client lease records.

use super::{EntityKind, Persistable};
use crate::error::StorageResult;
use crate::row::Row;
use serde::{Deserialize, Serialize};

/// A write lease held by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Client name holding the lease.
    pub holder: String,
    /// Numeric id of the holder, referenced by lease paths.
    pub holder_id: i32,
    /// Last renewal in milliseconds.
    pub last_update: i64,
}

impl Lease {
    /// Creates a lease.
    #[must_use]
    pub fn new(holder: impl Into<String>, holder_id: i32, last_update: i64) -> Self {
        Self {
            holder: holder.into(),
            holder_id,
            last_update,
        }
    }
}

impl Persistable for Lease {
    type Key = String;
    const KIND: EntityKind = EntityKind::Lease;

    fn key(&self) -> String {
        self.holder.clone()
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("holder", self.holder.as_str())
            .with("holder_id", self.holder_id)
            .with("last_update", self.last_update)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            holder: row.text("holder")?,
            holder_id: row.int32("holder_id")?,
            last_update: row.int("last_update")?,
        })
    }
}

/// A path held open by a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeasePath {
    /// Absolute path.
    pub path: String,
    /// Holder id of the owning lease.
    pub holder_id: i32,
}

impl LeasePath {
    /// Creates a lease path.
    #[must_use]
    pub fn new(path: impl Into<String>, holder_id: i32) -> Self {
        Self {
            path: path.into(),
            holder_id,
        }
    }
}

impl Persistable for LeasePath {
    type Key = String;
    const KIND: EntityKind = EntityKind::LeasePath;

    fn key(&self) -> String {
        self.path.clone()
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("path", self.path.as_str())
            .with("holder_id", self.holder_id)
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            path: row.text("path")?,
            holder_id: row.int32("holder_id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let lease = Lease::new("client-7", 7, 12_345);
        assert_eq!(Lease::from_row(&lease.to_row()).unwrap(), lease);

        let path = LeasePath::new("/user/a/part-0", 7);
        assert_eq!(LeasePath::from_row(&path.to_row()).unwrap(), path);
        assert_eq!(path.key(), "/user/a/part-0");
    }
}
