//! Test fixtures and cluster helpers.
//!
//! A [`TestCluster`] is one shared in-memory database standing in for the
//! cluster's metadata store. Each simulated namenode gets its own
//! [`TestNamenode`], holding an entity manager and election state.

use nnmeta_core::{
    Config, EntityManager, LeaderConfig, LeaderElection, MetadataStore, OperationKind,
};
use nnmeta_storage::{
    BlockInfo, EntityKind, INode, IndexedReplica, Lease, LeasePath, MemoryConfig, MemoryDatabase,
    Snapshot,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A shared metadata database and the store over it.
#[derive(Debug, Clone)]
pub struct TestCluster {
    /// The database every namenode talks to.
    pub db: Arc<MemoryDatabase>,
    /// The store handing out managers and handlers.
    pub store: MetadataStore,
}

impl TestCluster {
    /// Creates an empty cluster with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty cluster whose election tolerates `delta` missed
    /// heartbeats per namenode.
    pub fn with_delta(delta: i64) -> Self {
        Self::with_config(
            Config::new().leader(LeaderConfig::default().with_missed_heartbeat_threshold(delta)),
        )
    }

    /// Creates an empty cluster with `config`.
    pub fn with_config(config: Config) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let pool = db
            .pool(MemoryConfig::default())
            .expect("Failed to create connection pool");
        Self {
            store: MetadataStore::new(pool, config),
            db,
        }
    }

    /// Creates a cluster holding the rows of `snapshot`.
    pub fn from_snapshot(snapshot: &Snapshot, config: Config) -> Self {
        let db = Arc::new(MemoryDatabase::from_snapshot(snapshot).expect("Failed to load snapshot"));
        let pool = db
            .pool(MemoryConfig::default())
            .expect("Failed to create connection pool");
        Self {
            store: MetadataStore::new(pool, config),
            db,
        }
    }

    /// Returns a fresh manager on its own session.
    pub fn manager(&self) -> EntityManager {
        self.store.entity_manager()
    }

    /// Returns a namenode that has not joined the election yet.
    pub fn namenode(&self, hostname: &str) -> TestNamenode {
        let config = self.store.config().clone().hostname(hostname);
        TestNamenode {
            em: self.manager(),
            election: LeaderElection::new(&config),
        }
    }

    /// Returns the number of committed rows of `kind`.
    pub fn rows(&self, kind: EntityKind) -> usize {
        self.db.row_count(kind)
    }

    /// Writes a snapshot of the database to a temporary JSON file.
    pub fn snapshot_file(&self) -> NamedTempFile {
        let json = self
            .db
            .snapshot()
            .and_then(|snapshot| snapshot.to_json())
            .expect("Failed to snapshot database");
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(json.as_bytes())
            .expect("Failed to write snapshot");
        file
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// One simulated namenode process.
#[derive(Debug)]
pub struct TestNamenode {
    /// The namenode's own manager.
    pub em: EntityManager,
    /// The namenode's election state.
    pub election: LeaderElection,
}

impl TestNamenode {
    /// Joins the election. Returns the leader id.
    pub fn join(&mut self) -> i64 {
        self.election
            .initialize(&mut self.em)
            .expect("Failed to join election")
    }

    /// Runs one heartbeat round. Returns the leader id.
    pub fn heartbeat(&mut self) -> i64 {
        self.election
            .heartbeat(&mut self.em)
            .expect("Heartbeat failed")
    }

    /// Returns the namenode id.
    pub fn id(&self) -> i64 {
        self.election.id()
    }

    /// Returns true if the last round elected this namenode.
    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }
}

/// Runs a test against a fresh cluster.
///
/// # Example
///
/// ```rust
/// use nnmeta_testkit::with_cluster;
///
/// with_cluster(|cluster| {
///     let mut nn = cluster.namenode("nn1");
///     assert_eq!(nn.join(), 1);
/// });
/// ```
pub fn with_cluster<F, R>(f: F) -> R
where
    F: FnOnce(&TestCluster) -> R,
{
    let cluster = TestCluster::new();
    f(&cluster)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// The root inode id.
    pub const ROOT_ID: i64 = 1;

    /// Populates a namespace: a root directory with `dirs` directories of
    /// `files` single-block files each, every block on three storages.
    ///
    /// Inode ids are assigned breadth first from the root; block ids equal
    /// the owning file's id.
    pub fn populated_namespace(cluster: &TestCluster, dirs: i64, files: i64) {
        let mut em = cluster.manager();
        cluster
            .store
            .transactional(OperationKind::Mkdirs)
            .handle(&mut em, |em| {
                em.add(INode::directory(ROOT_ID, "", 0))?;
                let mut next = ROOT_ID + 1;
                for d in 0..dirs {
                    let dir = next;
                    next += 1;
                    em.add(INode::directory(dir, format!("dir{d}"), ROOT_ID))?;
                    for f in 0..files {
                        let file = next;
                        next += 1;
                        em.add(INode::file(file, format!("file{f}"), dir, 3, 128 << 20))?;
                        em.add(BlockInfo::new(file, file, 0))?;
                        for (index, storage) in (0..3).enumerate() {
                            em.add(IndexedReplica::new(file, storage, index as i32))?;
                        }
                    }
                }
                Ok(())
            })
            .expect("Failed to populate namespace");
    }

    /// Adds a lease held by `holder` on `paths`.
    pub fn lease_with_paths(cluster: &TestCluster, holder: &str, holder_id: i32, paths: &[&str]) {
        let mut em = cluster.manager();
        cluster
            .store
            .transactional(OperationKind::StartFile)
            .handle(&mut em, |em| {
                em.add(Lease::new(holder, holder_id, 0))?;
                for path in paths {
                    em.add(LeasePath::new(*path, holder_id))?;
                }
                Ok(())
            })
            .expect("Failed to add lease");
    }
}
