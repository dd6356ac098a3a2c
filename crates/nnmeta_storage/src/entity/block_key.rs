//! Block token signing keys.

use super::{EntityKind, Persistable};
use crate::error::{StorageError, StorageResult};
use crate::row::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Role of a block key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKeyType {
    /// The key currently used for signing.
    Current,
    /// The key that will become current on the next roll.
    Next,
    /// Any other retained key.
    Simple,
}

impl BlockKeyType {
    const fn code(self) -> i64 {
        match self {
            Self::Current => 0,
            Self::Next => 1,
            Self::Simple => -1,
        }
    }

    fn from_code(code: i64) -> StorageResult<Self> {
        match code {
            0 => Ok(Self::Current),
            1 => Ok(Self::Next),
            -1 => Ok(Self::Simple),
            other => Err(StorageError::invalid_value("key_type", other)),
        }
    }
}

/// A shared secret used to sign block access tokens.
///
/// Key material is wiped from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct BlockKey {
    /// Key id.
    pub key_id: i32,
    /// Expiry in milliseconds.
    pub expiry_date: i64,
    /// Secret key material.
    pub key_bytes: Vec<u8>,
    /// Role of the key.
    #[zeroize(skip)]
    pub key_type: BlockKeyType,
}

impl BlockKey {
    /// Creates a block key.
    #[must_use]
    pub fn new(key_id: i32, expiry_date: i64, key_bytes: Vec<u8>, key_type: BlockKeyType) -> Self {
        Self {
            key_id,
            expiry_date,
            key_bytes,
            key_type,
        }
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockKey")
            .field("key_id", &self.key_id)
            .field("expiry_date", &self.expiry_date)
            .field("key_type", &self.key_type)
            .field("key_len", &self.key_bytes.len())
            .finish_non_exhaustive()
    }
}

impl Persistable for BlockKey {
    type Key = i32;
    const KIND: EntityKind = EntityKind::BlockKey;

    fn key(&self) -> i32 {
        self.key_id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("key_id", self.key_id)
            .with("expiry_date", self.expiry_date)
            .with("key_bytes", self.key_bytes.clone())
            .with("key_type", self.key_type.code())
    }

    fn from_row(row: &Row) -> StorageResult<Self> {
        Ok(Self {
            key_id: row.int32("key_id")?,
            expiry_date: row.int("expiry_date")?,
            key_bytes: row.bytes("key_bytes")?,
            key_type: BlockKeyType::from_code(row.int("key_type")?)?,
        })
    }
}
