//! Shared in-memory metadata store.
//!
//! [`MemoryDatabase`] plays the part of the external replicated database in
//! tests, simulations and tooling. Rows are stored CBOR-encoded, so sessions
//! never share instances, and every committed row carries the commit
//! sequence that last wrote it.
//!
//! # Isolation
//!
//! Session writes are buffered and become visible atomically on commit.
//! Commit fails with a transient [`StorageError::Conflict`] when:
//! - a row this session writes was committed by someone else after `begin`
//! - under [`LockMode::Shared`] or [`LockMode::Exclusive`], a row this
//!   session read changed before commit

use crate::backend::{LockMode, RowBatch, Session, StorageConnector};
use crate::entity::{row_key, EntityKind, Persistable};
use crate::error::{StorageError, StorageResult};
use crate::pool::ConnectorPool;
use crate::row::Row;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuration for pools over a [`MemoryDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Number of connectors in the pool.
    pub connectors: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { connectors: 4 }
    }
}

impl MemoryConfig {
    /// Sets the number of connectors.
    #[must_use]
    pub const fn connectors(mut self, n: usize) -> Self {
        self.connectors = n;
        self
    }
}

/// Where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Row reads and scans.
    Read,
    /// Batched writes.
    Apply,
    /// Commits.
    Commit,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    remaining: u32,
    transient: bool,
}

/// Operation counters of a [`MemoryDatabase`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Sessions opened.
    pub sessions_opened: u64,
    /// Point reads.
    pub reads: u64,
    /// Table scans.
    pub scans: u64,
    /// Applied write batches per entity kind.
    pub batches: BTreeMap<EntityKind, u64>,
    /// Successful commits.
    pub commits: u64,
    /// Rollbacks of active transactions.
    pub rollbacks: u64,
    /// Table truncations.
    pub truncates: u64,
}

impl MemoryStats {
    /// Returns the number of batches applied for `kind`.
    #[must_use]
    pub fn batches_for(&self, kind: EntityKind) -> u64 {
        self.batches.get(&kind).copied().unwrap_or(0)
    }

    /// Returns the number of backend round trips of any kind.
    #[must_use]
    pub fn round_trips(&self) -> u64 {
        self.reads + self.scans + self.batches.values().sum::<u64>() + self.commits + self.truncates
    }
}

/// A portable copy of every table, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Rows of each table.
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl Snapshot {
    /// Decodes the rows of entity `T`.
    pub fn rows<T: Persistable>(&self) -> StorageResult<Vec<T>> {
        self.tables
            .get(T::KIND.table_name())
            .map(|rows| rows.iter().map(T::from_row).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Serializes the snapshot as pretty JSON.
    pub fn to_json(&self) -> StorageResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StorageError::Snapshot(e.to_string()))
    }

    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        serde_json::from_str(json).map_err(|e| StorageError::Snapshot(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    version: u64,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<EntityKind, BTreeMap<Vec<u8>, StoredRow>>,
    // Commit sequence of the last delete of each key no longer stored.
    tombstones: HashMap<EntityKind, BTreeMap<Vec<u8>, u64>>,
    commit_seq: u64,
}

impl Tables {
    fn version_of(&self, kind: EntityKind, key: &[u8]) -> u64 {
        if let Some(row) = self.rows.get(&kind).and_then(|t| t.get(key)) {
            return row.version;
        }
        self.tombstones
            .get(&kind)
            .and_then(|t| t.get(key))
            .copied()
            .unwrap_or(0)
    }

    fn put(&mut self, kind: EntityKind, key: Vec<u8>, row: StoredRow) {
        if let Some(tombstones) = self.tombstones.get_mut(&kind) {
            tombstones.remove(&key);
        }
        self.rows.entry(kind).or_default().insert(key, row);
    }

    fn delete(&mut self, kind: EntityKind, key: Vec<u8>, seq: u64) {
        if let Some(table) = self.rows.get_mut(&kind) {
            table.remove(&key);
        }
        self.tombstones.entry(kind).or_default().insert(key, seq);
    }

    fn truncate(&mut self, kind: EntityKind, seq: u64) {
        if let Some(table) = self.rows.remove(&kind) {
            let tombstones = self.tombstones.entry(kind).or_default();
            tombstones.extend(table.into_keys().map(|key| (key, seq)));
        }
    }
}

/// A shared, thread-safe, in-memory metadata store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
    faults: Mutex<HashMap<FaultPoint, Fault>>,
    stats: Mutex<MemoryStats>,
    next_session: AtomicU64,
}

impl MemoryDatabase {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded from a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> StorageResult<Self> {
        let db = Self::new();
        {
            let mut tables = db.tables.write();
            for (name, rows) in &snapshot.tables {
                let kind = EntityKind::from_table_name(name)
                    .ok_or_else(|| StorageError::Snapshot(format!("unknown table `{name}`")))?;
                let table = tables.rows.entry(kind).or_default();
                for row in rows {
                    table.insert(
                        row_key(kind, row)?,
                        StoredRow {
                            version: 0,
                            bytes: encode_row(row)?,
                        },
                    );
                }
            }
        }
        Ok(db)
    }

    /// Copies every non-empty table into a snapshot.
    pub fn snapshot(&self) -> StorageResult<Snapshot> {
        let tables = self.tables.read();
        let mut snapshot = Snapshot::default();
        for kind in EntityKind::ALL {
            let Some(table) = tables.rows.get(&kind) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            let rows = table
                .values()
                .map(|r| decode_row(&r.bytes))
                .collect::<StorageResult<Vec<_>>>()?;
            snapshot.tables.insert(kind.table_name().to_string(), rows);
        }
        Ok(snapshot)
    }

    /// Creates a named connector to this store.
    #[must_use]
    pub fn connector(self: &Arc<Self>, name: impl Into<String>) -> MemoryConnector {
        MemoryConnector {
            name: name.into(),
            db: Arc::clone(self),
        }
    }

    /// Creates a connection pool with `config.connectors` connectors.
    pub fn pool(self: &Arc<Self>, config: MemoryConfig) -> StorageResult<ConnectorPool> {
        let connectors = (0..config.connectors)
            .map(|i| Arc::new(self.connector(format!("memory-{i}"))) as Arc<dyn StorageConnector>)
            .collect();
        ConnectorPool::new(connectors)
    }

    /// Returns the number of committed rows of `kind`.
    #[must_use]
    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables.read().rows.get(&kind).map_or(0, BTreeMap::len)
    }

    /// Makes the next `times` operations at `point` fail.
    pub fn fail_next(&self, point: FaultPoint, times: u32, transient: bool) {
        self.faults.lock().insert(
            point,
            Fault {
                remaining: times,
                transient,
            },
        );
    }

    /// Returns a copy of the operation counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        self.stats.lock().clone()
    }

    /// Resets the operation counters.
    pub fn reset_stats(&self) {
        *self.stats.lock() = MemoryStats::default();
    }

    fn check_fault(&self, point: FaultPoint) -> StorageResult<()> {
        let mut faults = self.faults.lock();
        let Some(fault) = faults.get_mut(&point) else {
            return Ok(());
        };
        if fault.remaining == 0 {
            return Ok(());
        }
        fault.remaining -= 1;
        let message = format!("injected {point:?} failure");
        if fault.transient {
            Err(StorageError::unavailable(message))
        } else {
            Err(StorageError::Backend(message))
        }
    }

    fn truncate_committed(&self, kinds: &[EntityKind]) {
        let mut tables = self.tables.write();
        tables.commit_seq += 1;
        let seq = tables.commit_seq;
        for kind in kinds {
            tables.truncate(*kind, seq);
        }
    }
}

fn encode_row(row: &Row) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(row, &mut buf).map_err(|e| StorageError::Encoding(e.to_string()))?;
    Ok(buf)
}

fn decode_row(bytes: &[u8]) -> StorageResult<Row> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Encoding(e.to_string()))
}

/// A connector to a [`MemoryDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    name: String,
    db: Arc<MemoryDatabase>,
}

impl StorageConnector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_session(&self) -> StorageResult<Box<dyn Session>> {
        let id = self.db.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        self.db.stats.lock().sessions_opened += 1;
        Ok(Box::new(MemorySession {
            id,
            db: Arc::clone(&self.db),
            active: false,
            lock_mode: LockMode::default(),
            begin_seq: 0,
            writes: BTreeMap::new(),
            truncated: BTreeSet::new(),
            read_versions: HashMap::new(),
        }))
    }

    fn format(&self, kinds: &[EntityKind]) -> StorageResult<()> {
        self.db.truncate_committed(kinds);
        Ok(())
    }
}

/// A session against a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    db: Arc<MemoryDatabase>,
    active: bool,
    lock_mode: LockMode,
    begin_seq: u64,
    // None marks a buffered delete.
    writes: BTreeMap<(EntityKind, Vec<u8>), Option<Vec<u8>>>,
    truncated: BTreeSet<EntityKind>,
    read_versions: HashMap<(EntityKind, Vec<u8>), u64>,
}

impl MemorySession {
    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    fn require_active(&self) -> StorageResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(StorageError::NoTransaction)
        }
    }

    fn reset(&mut self) {
        self.active = false;
        self.writes.clear();
        self.truncated.clear();
        self.read_versions.clear();
    }

    fn find_conflict(&self, tables: &Tables) -> Option<StorageError> {
        for (kind, key) in self.writes.keys() {
            if !self.truncated.contains(kind) && tables.version_of(*kind, key) > self.begin_seq {
                return Some(StorageError::conflict(*kind, "row written concurrently"));
            }
        }
        if self.lock_mode != LockMode::ReadCommitted {
            for ((kind, key), version) in &self.read_versions {
                if tables.version_of(*kind, key) != *version {
                    return Some(StorageError::conflict(*kind, "row read changed before commit"));
                }
            }
        }
        None
    }

    fn tracks_reads(&self) -> bool {
        self.active && self.lock_mode != LockMode::ReadCommitted
    }

    // Encoded row visible to this session, honoring its own buffered writes.
    fn visible(&mut self, tables: &Tables, kind: EntityKind, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(buffered) = self.writes.get(&(kind, key.to_vec())) {
            return buffered.clone();
        }
        if self.truncated.contains(&kind) {
            return None;
        }
        if self.tracks_reads() {
            self.read_versions
                .entry((kind, key.to_vec()))
                .or_insert_with(|| tables.version_of(kind, key));
        }
        tables
            .rows
            .get(&kind)
            .and_then(|t| t.get(key))
            .map(|r| r.bytes.clone())
    }
}

impl Session for MemorySession {
    fn begin(&mut self) -> StorageResult<()> {
        if self.active {
            return Err(StorageError::TransactionActive);
        }
        self.begin_seq = self.db.tables.read().commit_seq;
        self.active = true;
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.require_active()?;
        if let Err(err) = self.db.check_fault(FaultPoint::Commit) {
            self.reset();
            return Err(err);
        }

        let db = Arc::clone(&self.db);
        let mut tables = db.tables.write();
        if let Some(err) = self.find_conflict(&tables) {
            drop(tables);
            self.reset();
            return Err(err);
        }

        tables.commit_seq += 1;
        let seq = tables.commit_seq;
        for kind in &self.truncated {
            tables.truncate(*kind, seq);
        }
        for ((kind, key), write) in std::mem::take(&mut self.writes) {
            match write {
                Some(bytes) => tables.put(
                    kind,
                    key,
                    StoredRow {
                        version: seq,
                        bytes,
                    },
                ),
                None => tables.delete(kind, key, seq),
            }
        }
        drop(tables);

        self.db.stats.lock().commits += 1;
        self.reset();
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if self.active {
            self.db.stats.lock().rollbacks += 1;
            self.reset();
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    fn set_lock_mode(&mut self, mode: LockMode) {
        self.lock_mode = mode;
    }

    fn read(&mut self, kind: EntityKind, key: &[u8]) -> StorageResult<Option<Row>> {
        self.db.stats.lock().reads += 1;
        self.db.check_fault(FaultPoint::Read)?;
        let db = Arc::clone(&self.db);
        let tables = db.tables.read();
        self.visible(&tables, kind, key)
            .map(|bytes| decode_row(&bytes))
            .transpose()
    }

    fn scan(&mut self, kind: EntityKind) -> StorageResult<Vec<Row>> {
        self.db.stats.lock().scans += 1;
        self.db.check_fault(FaultPoint::Read)?;
        let db = Arc::clone(&self.db);
        let tables = db.tables.read();

        let mut keys: BTreeSet<Vec<u8>> = BTreeSet::new();
        if !self.truncated.contains(&kind) {
            if let Some(table) = tables.rows.get(&kind) {
                keys.extend(table.keys().cloned());
            }
        }
        keys.extend(
            self.writes
                .keys()
                .filter(|(k, _)| *k == kind)
                .map(|(_, key)| key.clone()),
        );

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.visible(&tables, kind, &key) {
                rows.push(decode_row(&bytes)?);
            }
        }
        Ok(rows)
    }

    fn apply(&mut self, kind: EntityKind, batch: RowBatch) -> StorageResult<()> {
        self.require_active()?;
        self.db.check_fault(FaultPoint::Apply)?;
        *self.db.stats.lock().batches.entry(kind).or_insert(0) += 1;

        let db = Arc::clone(&self.db);
        let tables = db.tables.read();
        for key in batch.removed {
            self.writes.insert((kind, key), None);
        }
        for (key, row) in batch.added {
            if self.visible(&tables, kind, &key).is_some() {
                return Err(StorageError::DuplicateKey { kind });
            }
            self.writes.insert((kind, key), Some(encode_row(&row)?));
        }
        for (key, row) in batch.modified {
            self.writes.insert((kind, key), Some(encode_row(&row)?));
        }
        Ok(())
    }

    fn truncate(&mut self, kind: EntityKind) -> StorageResult<()> {
        self.require_active()?;
        self.db.stats.lock().truncates += 1;
        self.writes.retain(|(k, _), _| *k != kind);
        self.truncated.insert(kind);
        Ok(())
    }
}
