//! Row mapping round trips for every entity kind.

use nnmeta_storage::*;
use proptest::prelude::*;

fn round_trips<T: Persistable>(entity: &T) {
    let row = entity.to_row();
    let back = T::from_row(&row).unwrap();
    assert_eq!(&back, entity);
    assert_eq!(back.to_row(), row);
    assert_eq!(back.key(), entity.key());
}

fn opt_text() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z0-9.-]{1,12}")
}

prop_compose! {
    fn inode()(
        id in any::<i64>(),
        name in "[a-zA-Z0-9_.]{1,16}",
        parent_id in any::<i64>(),
        is_dir in any::<bool>(),
        times in (any::<i64>(), any::<i64>()),
        permission in proptest::collection::vec(any::<u8>(), 0..8),
        quotas in (any::<i64>(), any::<i64>(), any::<i64>(), any::<i64>()),
        flags in (any::<bool>(), any::<bool>()),
        client in (opt_text(), opt_text(), opt_text()),
        header in any::<i64>(),
        symlink in opt_text(),
    ) -> INode {
        INode {
            id,
            name,
            parent_id,
            is_dir,
            modification_time: times.0,
            access_time: times.1,
            permission,
            nsquota: quotas.0,
            dsquota: quotas.1,
            nscount: quotas.2,
            dscount: quotas.3,
            is_dir_with_quota: flags.0,
            is_under_construction: flags.1,
            client_name: client.0,
            client_machine: client.1,
            client_node: client.2,
            header,
            symlink,
        }
    }
}

fn uc_state() -> impl Strategy<Value = BlockUcState> {
    prop_oneof![
        Just(BlockUcState::Complete),
        Just(BlockUcState::UnderConstruction),
        Just(BlockUcState::UnderRecovery),
        Just(BlockUcState::Committed),
    ]
}

prop_compose! {
    fn block()(
        block_id in any::<i64>(),
        block_index in any::<i32>(),
        inode_id in any::<i64>(),
        num_bytes in any::<i64>(),
        generation_stamp in any::<i64>(),
        uc_state in uc_state(),
        time_stamp in any::<i64>(),
        primary_node_index in any::<i32>(),
        block_recovery_id in any::<i64>(),
    ) -> BlockInfo {
        BlockInfo {
            block_id,
            block_index,
            inode_id,
            num_bytes,
            generation_stamp,
            uc_state,
            time_stamp,
            primary_node_index,
            block_recovery_id,
        }
    }
}

fn replica_state() -> impl Strategy<Value = ReplicaState> {
    prop_oneof![
        Just(ReplicaState::Finalized),
        Just(ReplicaState::Rbw),
        Just(ReplicaState::Rwr),
        Just(ReplicaState::Rur),
        Just(ReplicaState::Temporary),
    ]
}

fn key_type() -> impl Strategy<Value = BlockKeyType> {
    prop_oneof![
        Just(BlockKeyType::Current),
        Just(BlockKeyType::Next),
        Just(BlockKeyType::Simple),
    ]
}

proptest! {
    #[test]
    fn inode_rows(inode in inode()) {
        round_trips(&inode);
    }

    #[test]
    fn block_rows(block in block()) {
        round_trips(&block);
    }

    #[test]
    fn replica_rows(
        block_id in any::<i64>(),
        storage_id in any::<i32>(),
        index in any::<i32>(),
        state in replica_state(),
        stamps in (any::<i64>(), any::<i64>()),
    ) {
        round_trips(&IndexedReplica::new(block_id, storage_id, index));
        round_trips(&ReplicaUnderConstruction::new(block_id, storage_id, state, index));
        round_trips(&InvalidatedBlock::new(block_id, storage_id, stamps.0, stamps.1));
        round_trips(&ExcessReplica::new(block_id, storage_id));
        round_trips(&CorruptReplica::new(block_id, storage_id));
    }

    #[test]
    fn queue_rows(block_id in any::<i64>(), level in any::<i32>(), ts in any::<i64>()) {
        round_trips(&UnderReplicatedBlock::new(block_id, level));
        round_trips(&PendingBlockInfo::new(block_id, ts, level));
    }

    #[test]
    fn lease_rows(holder in "[a-z_0-9]{1,20}", holder_id in any::<i32>(), ts in any::<i64>(), path in "/[a-z/]{0,30}") {
        round_trips(&Lease::new(holder, holder_id, ts));
        round_trips(&LeasePath::new(path, holder_id));
    }

    #[test]
    fn block_key_rows(
        key_id in any::<i32>(),
        expiry in any::<i64>(),
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
        key_type in key_type(),
    ) {
        round_trips(&BlockKey::new(key_id, expiry, bytes, key_type));
    }

    #[test]
    fn leader_and_counter_rows(
        id in any::<i64>(),
        counter in any::<i64>(),
        ts in any::<i64>(),
        host in "[a-z0-9.]{1,20}",
        latency in any::<i32>(),
    ) {
        let mut leader = Leader::new(id, counter, ts, host.clone());
        leader.avg_request_processing_latency = latency;
        round_trips(&leader);
        round_trips(&Counter::new(latency, host, counter));
    }

    #[test]
    fn rows_survive_the_backend(inode in inode()) {
        let db = std::sync::Arc::new(MemoryDatabase::new());
        let pool = db.pool(MemoryConfig::default()).unwrap();
        let mut session = pool.obtain_session().unwrap();
        session.begin().unwrap();
        DataAccess::<INode>::new(session.as_mut())
            .prepare([], [&inode], [])
            .unwrap();
        session.commit().unwrap();

        let back = DataAccess::<INode>::new(session.as_mut())
            .find_by_key(&inode.id)
            .unwrap();
        prop_assert_eq!(back, Some(inode));
    }
}
