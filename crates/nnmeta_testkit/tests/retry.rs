//! Request handlers under injected backend faults.

use nnmeta_core::{CoreError, ErrorKind, INodeFinder, NamesystemLock, OperationKind};
use nnmeta_storage::{DataAccess, EntityKind, FaultPoint, INode, Lease, StorageError};
use nnmeta_testkit::TestCluster;

fn cluster_with_root() -> TestCluster {
    let cluster = TestCluster::new();
    cluster
        .manager()
        .add(INode::directory(1, "", 0))
        .unwrap();
    cluster
}

#[test]
fn transient_read_faults_are_retried() {
    let cluster = cluster_with_root();
    cluster.db.fail_next(FaultPoint::Read, 2, true);

    let mut attempts = 0;
    let mut em = cluster.manager();
    let root = cluster
        .store
        .transactional(OperationKind::GetFileInfo)
        .handle(&mut em, |em| {
            attempts += 1;
            em.find::<INode>(&INodeFinder::ById(1))
        })
        .unwrap();

    assert!(root.is_some());
    assert_eq!(attempts, 3);
}

#[test]
fn exhausted_budget_surfaces_last_error() {
    let cluster = cluster_with_root();
    cluster.db.fail_next(FaultPoint::Read, 3, true);

    let mut attempts = 0;
    let mut em = cluster.manager();
    let err = cluster
        .store
        .transactional(OperationKind::GetFileInfo)
        .handle(&mut em, |em| {
            attempts += 1;
            em.find::<INode>(&INodeFinder::ById(1))
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Retryable);
    assert_eq!(attempts, 3);
    assert!(!em.is_active());
}

#[test]
fn commit_failure_reruns_whole_unit() {
    let cluster = cluster_with_root();
    cluster.db.fail_next(FaultPoint::Commit, 1, true);

    let mut attempts = 0;
    let mut em = cluster.manager();
    cluster
        .store
        .transactional(OperationKind::Mkdirs)
        .handle(&mut em, |em| {
            attempts += 1;
            em.add(INode::directory(2, "tmp", 1))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(cluster.rows(EntityKind::INode), 2);
}

#[test]
fn permanent_apply_fault_still_retries() {
    let cluster = cluster_with_root();
    cluster.db.fail_next(FaultPoint::Apply, 1, false);

    let mut attempts = 0;
    let mut em = cluster.manager();
    cluster
        .store
        .transactional(OperationKind::Mkdirs)
        .handle(&mut em, |em| {
            attempts += 1;
            em.add(INode::directory(2, "tmp", 1))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(attempts, 2, "a failed prepare reruns the unit of work");
}

#[test]
fn permanent_read_fault_is_not_retried() {
    let cluster = cluster_with_root();
    cluster.db.fail_next(FaultPoint::Read, 1, false);

    let mut attempts = 0;
    let mut em = cluster.manager();
    let err = cluster
        .store
        .transactional(OperationKind::GetFileInfo)
        .handle(&mut em, |em| {
            attempts += 1;
            em.find::<INode>(&INodeFinder::ById(1))
        })
        .unwrap_err();

    assert!(matches!(err, CoreError::Storage(StorageError::Backend(_))));
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(attempts, 1);
}

#[test]
fn domain_error_commits_before_returning() {
    let cluster = cluster_with_root();
    let mut em = cluster.manager();
    let err = cluster
        .store
        .transactional(OperationKind::Mkdirs)
        .handle(&mut em, |em| {
            em.add(INode::directory(3, "kept", 1))?;
            Err::<(), _>(CoreError::domain("quota exceeded"))
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Domain);
    assert_eq!(cluster.rows(EntityKind::INode), 2);
}

#[test]
fn write_lock_released_after_each_attempt() {
    let cluster = cluster_with_root();
    let lock = NamesystemLock::new();
    cluster.db.fail_next(FaultPoint::Read, 5, true);

    let mut em = cluster.manager();
    let result = cluster
        .store
        .transactional(OperationKind::Delete)
        .with_write_lock(&lock)
        .handle(&mut em, |em| {
            assert!(lock.is_write_locked());
            em.find::<INode>(&INodeFinder::ById(1))
        });

    assert!(result.is_err());
    assert!(!lock.is_write_locked());
}

#[test]
fn lightweight_handler_retries_transient_faults() {
    let cluster = TestCluster::new();
    nnmeta_testkit::scenarios::lease_with_paths(&cluster, "client-1", 1, &["/a"]);
    cluster.db.fail_next(FaultPoint::Read, 1, true);

    let mut attempts = 0;
    let count = cluster
        .store
        .lightweight(OperationKind::CountLease)
        .handle(|session| {
            attempts += 1;
            Ok(DataAccess::<Lease>::new(session).count_all()?)
        })
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(attempts, 2);
}
