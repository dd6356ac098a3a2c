//! Business operation labels.

use std::fmt;

macro_rules! operation_kinds {
    ($($(#[$doc:meta])* $variant:ident => $label:literal,)+) => {
        /// The business operation a request handler runs on behalf of.
        ///
        /// Labels exist for log correlation only; they never change how a
        /// request is executed.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OperationKind {
            $($(#[$doc])* $variant,)+
        }

        impl OperationKind {
            /// Every operation, in declaration order.
            pub const ALL: &'static [OperationKind] = &[$(Self::$variant,)+];

            /// Returns the stable label used in logs.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }
    };
}

operation_kinds! {
    // Client protocol
    /// Namesystem start-up.
    Initialize => "INITIALIZE",
    /// Permission change.
    SetPermission => "SET_PERMISSION",
    /// Owner change.
    SetOwner => "SET_OWNER",
    /// Block location lookup.
    GetBlockLocations => "GET_BLOCK_LOCATIONS",
    /// File concatenation.
    Concat => "CONCAT",
    /// Access and modification time update.
    SetTimes => "SET_TIMES",
    /// Replication factor change.
    SetReplication => "SET_REPLICATION",
    /// File creation.
    StartFile => "START_FILE",
    /// Lease recovery.
    RecoverLease => "RECOVER_LEASE",
    /// Append to an existing file.
    AppendFile => "APPEND_FILE",
    /// Block allocation for a file being written.
    GetAdditionalBlock => "GET_ADDITIONAL_BLOCK",
    /// Block abandonment.
    AbandonBlock => "ABANDON_BLOCK",
    /// File completion.
    CompleteFile => "COMPLETE_FILE",
    /// Rename.
    Rename => "RENAME_TO",
    /// Delete.
    Delete => "DELETE",
    /// File status lookup.
    GetFileInfo => "GET_FILE_INFO",
    /// Directory creation.
    Mkdirs => "MKDIRS",
    /// Quota change.
    SetQuota => "SET_QUOTA",
    /// Lease renewal.
    RenewLease => "RENEW_LEASE",
    /// Directory listing.
    GetListing => "GET_LISTING",
    /// Pipeline update after a datanode failure.
    UpdatePipeline => "UPDATE_PIPELINE",
    /// Root inode lookup.
    GetRoot => "GET_ROOT",

    // Block management
    /// Datanode registration.
    RegisterDatanode => "REGISTER_DATANODE",
    /// Datanode heartbeat.
    HandleHeartbeat => "HANDLE_HEARTBEAT",
    /// Corrupt replica reporting.
    FindAndMarkBlocksAsCorrupt => "FIND_AND_MARK_BLOCKS_AS_CORRUPT",
    /// Full block report.
    ProcessReport => "PROCESS_REPORT",
    /// Incremental block report.
    BlockReceivedAndDeleted => "BLOCK_RECEIVED_AND_DELETED",
    /// Replication monitor pass.
    ReplicationMonitor => "REPLICATION_MONITOR",
    /// Datanode removal.
    RemoveDatanode => "REMOVE_DATANODE",
    /// Decommission monitor pass.
    DecommissionMonitor => "DECOMMISSION_MONITOR",
    /// Heartbeat monitor pass.
    HeartbeatMonitor => "HEARTBEAT_MONITOR",
    /// Lease monitor pass.
    LeaseManagerMonitor => "LEASE_MANAGER_MONITOR",
    /// Lease count.
    CountLease => "COUNT_LEASE",

    // Leader election
    /// Active namenode listing.
    SelectAllNamenodes => "SELECT_ALL_NAMENODES",
    /// Leader lookup.
    GetLeader => "GET_LEADER",
    /// One election round.
    LeaderElection => "LEADER_ELECTION",
    /// Heartbeat counter update.
    UpdateLeaderCounter => "UPDATE_LEADER_COUNTER",
    /// Stale predecessor cleanup.
    RemovePrevLeaders => "REMOVE_PREV_LEADERS",

    // Block tokens
    /// Block key insertion.
    AddBlockTokens => "ADD_BLOCK_TOKENS",
    /// Block key listing.
    GetAllBlockTokens => "GET_ALL_BLOCK_TOKENS",
    /// Block key lookup by role.
    GetKeyByType => "GET_KEY_BY_TYPE",
    /// Block key lookup by id.
    GetKeyById => "GET_KEY_BY_ID",
    /// Block key rotation.
    UpdateBlockKeys => "UPDATE_BLOCK_KEYS",
    /// Block key table reset.
    RemoveAll => "REMOVE_ALL",

    // Counters
    /// Generation stamp read.
    GetGenerationStamp => "GET_GENERATION_STAMP",
    /// Generation stamp allocation.
    SetGenerationStamp => "SET_GENERATION_STAMP",
    /// Counter table reset.
    FormatCounters => "FORMAT_COUNTERS",

    // Diagnostics
    /// Table inspection.
    Inspect => "INSPECT",
    /// Synthetic load.
    Simulate => "SIMULATE",
    /// Unit tests.
    Test => "TEST",
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
