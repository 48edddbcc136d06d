//! Lifecycle events emitted by the middleware
//!
//! Events are explicit and typed. Each one has a stable wire name and a
//! default severity used by `Logger::event`.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & lifecycle
    BootStart,
    BootComplete,
    Serving,
    ShutdownStart,
    ShutdownComplete,
    ConfigLoaded,

    // Nodes
    NodeAccessRevoked,
    NodeAccessGranted,
    NodeProbeFailed,
    NodePoolClosed,

    // Locks & transactions
    LockConflict,
    TxnCommit,
    TxnRollback,

    // Replication
    ReplicationStart,
    ReplicationApplied,
    ReplicationDeferred,
    ReplicationSuperseded,

    // Recovery log
    LogAppend,
    LogAppendFailed,
    LogStatusChange,
    LogLoaded,
    /// Unreadable recovery log on open (FATAL)
    LogCorruption,

    // Pending-log resolution
    ResolveStart,
    ResolveComplete,
    CheckpointAdvanced,
    CheckpointHeld,

    // Background resolver
    SchedulerStart,
    SchedulerTick,
    SchedulerStop,

    // Diagnostics
    SimulationStart,
    SimulationComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "FRAGDB_STARTUP_BEGIN",
            Event::BootComplete => "FRAGDB_STARTUP_COMPLETE",
            Event::Serving => "FRAGDB_SERVING",
            Event::ShutdownStart => "SHUTDOWN_BEGIN",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::NodeAccessRevoked => "NODE_ACCESS_REVOKED",
            Event::NodeAccessGranted => "NODE_ACCESS_GRANTED",
            Event::NodeProbeFailed => "NODE_PROBE_FAILED",
            Event::NodePoolClosed => "NODE_POOL_CLOSED",

            Event::LockConflict => "LOCK_CONFLICT",
            Event::TxnCommit => "TXN_COMMIT",
            Event::TxnRollback => "TXN_ROLLBACK",

            Event::ReplicationStart => "REPLICATION_BEGIN",
            Event::ReplicationApplied => "REPLICATION_APPLIED",
            Event::ReplicationDeferred => "REPLICATION_DEFERRED",
            Event::ReplicationSuperseded => "REPLICATION_SUPERSEDED",

            Event::LogAppend => "RECOVERY_LOG_APPEND",
            Event::LogAppendFailed => "RECOVERY_LOG_APPEND_FAILED",
            Event::LogStatusChange => "RECOVERY_LOG_STATUS_CHANGE",
            Event::LogLoaded => "RECOVERY_LOG_LOADED",
            Event::LogCorruption => "RECOVERY_LOG_CORRUPTION",

            Event::ResolveStart => "RESOLVE_BEGIN",
            Event::ResolveComplete => "RESOLVE_COMPLETE",
            Event::CheckpointAdvanced => "CHECKPOINT_ADVANCED",
            Event::CheckpointHeld => "CHECKPOINT_HELD",

            Event::SchedulerStart => "RESOLVER_START",
            Event::SchedulerTick => "RESOLVER_TICK",
            Event::SchedulerStop => "RESOLVER_STOP",

            Event::SimulationStart => "SIMULATION_BEGIN",
            Event::SimulationComplete => "SIMULATION_COMPLETE",
        }
    }

    /// Severity the event is logged at unless the caller overrides it.
    pub fn severity(&self) -> Severity {
        match self {
            Event::LogCorruption => Severity::Fatal,
            Event::LogAppendFailed => Severity::Error,
            Event::NodeAccessRevoked
            | Event::NodeProbeFailed
            | Event::LockConflict
            | Event::ReplicationDeferred
            | Event::CheckpointHeld => Severity::Warn,
            Event::SchedulerTick
            | Event::LogStatusChange
            | Event::TxnCommit
            | Event::TxnRollback => Severity::Trace,
            _ => Severity::Info,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
