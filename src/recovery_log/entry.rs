//! Recovery log entries and their status fields

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{OpType, Record, RecordImage};
use crate::node::NodeId;

/// Whether the operation reached its replication target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationStatus {
    /// Not yet confirmed on the target
    Pending,
    /// Confirmed on the target
    Done,
    /// Abandoned by an operator; never retried
    Failed,
    /// Overtaken by a newer write to the same key from the other replica
    Superseded,
}

impl ReplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationStatus::Pending => "PENDING",
            ReplicationStatus::Done => "DONE",
            ReplicationStatus::Failed => "FAILED",
            ReplicationStatus::Superseded => "SUPERSEDED",
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ReplicationStatus::Pending => 0,
            ReplicationStatus::Done => 1,
            ReplicationStatus::Failed => 2,
            ReplicationStatus::Superseded => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReplicationStatus::Pending),
            1 => Some(ReplicationStatus::Done),
            2 => Some(ReplicationStatus::Failed),
            3 => Some(ReplicationStatus::Superseded),
            _ => None,
        }
    }
}

impl fmt::Display for ReplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the operation took effect on the originating node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalStatus {
    Applied,
    Pending,
}

impl LocalStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            LocalStatus::Applied => 0,
            LocalStatus::Pending => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(LocalStatus::Applied),
            1 => Some(LocalStatus::Pending),
            _ => None,
        }
    }
}

/// One logged write awaiting (or done with) replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryLogEntry {
    pub log_id: u64,
    /// Node whose log holds the entry, i.e. where the write originated
    pub pool: NodeId,
    pub key: i64,
    pub image: RecordImage,
    pub local_status: LocalStatus,
    pub replication_status: ReplicationStatus,
    pub created_at: DateTime<Utc>,
}

impl RecoveryLogEntry {
    pub fn op_type(&self) -> OpType {
        self.image.op_type()
    }

    pub fn before(&self) -> Option<&Record> {
        self.image.before()
    }

    pub fn after(&self) -> Option<&Record> {
        self.image.after()
    }

    pub fn is_pending(&self) -> bool {
        self.replication_status == ReplicationStatus::Pending
    }
}
