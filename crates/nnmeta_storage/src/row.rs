//! Column values and rows.
//!
//! A [`Row`] is the backend-facing form of an entity: a map from column name
//! to [`Value`]. Entities convert to and from rows through
//! [`Persistable`](crate::Persistable).

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer of any width up to 64 bits.
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A named-column row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, builder style.
    #[must_use]
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column value.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.columns.insert(column.to_string(), value.into());
    }

    /// Returns a column value, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterates over columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, column: &str) -> StorageResult<&Value> {
        self.get(column)
            .ok_or_else(|| StorageError::missing_column(column))
    }

    /// Reads an integer column.
    pub fn int(&self, column: &str) -> StorageResult<i64> {
        match self.require(column)? {
            Value::Int(v) => Ok(*v),
            _ => Err(StorageError::column_type(column, "an integer")),
        }
    }

    /// Reads an integer column that must fit in 32 bits.
    pub fn int32(&self, column: &str) -> StorageResult<i32> {
        let v = self.int(column)?;
        i32::try_from(v).map_err(|_| StorageError::invalid_value(column, v))
    }

    /// Reads a boolean column.
    pub fn bool(&self, column: &str) -> StorageResult<bool> {
        match self.require(column)? {
            Value::Bool(v) => Ok(*v),
            _ => Err(StorageError::column_type(column, "a boolean")),
        }
    }

    /// Reads a text column.
    pub fn text(&self, column: &str) -> StorageResult<String> {
        match self.require(column)? {
            Value::Text(v) => Ok(v.clone()),
            _ => Err(StorageError::column_type(column, "text")),
        }
    }

    /// Reads a nullable text column.
    pub fn opt_text(&self, column: &str) -> StorageResult<Option<String>> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v.clone())),
            _ => Err(StorageError::column_type(column, "text or null")),
        }
    }

    /// Reads a bytes column.
    pub fn bytes(&self, column: &str) -> StorageResult<Vec<u8>> {
        match self.require(column)? {
            Value::Bytes(v) => Ok(v.clone()),
            _ => Err(StorageError::column_type(column, "bytes")),
        }
    }
}
