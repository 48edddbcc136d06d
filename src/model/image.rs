//! Before/after images of a write
//!
//! `RecordImage` is the single representation of what a write did. It is
//! stored in the recovery log and replayed by the replication engine, and
//! is serialized through exactly one `encode`/`decode` pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::record::Record;
use crate::errors::{FragError, FragResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpType {
    Insert,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Insert => "INSERT",
            OpType::Update => "UPDATE",
            OpType::Delete => "DELETE",
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            OpType::Insert => 0,
            OpType::Update => 1,
            OpType::Delete => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OpType::Insert),
            1 => Some(OpType::Update),
            2 => Some(OpType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum RecordImage {
    Insert {
        after: Record,
    },
    Update {
        #[serde(default)]
        before: Option<Record>,
        after: Record,
    },
    /// A delete known only by key carries no before-image.
    Delete {
        #[serde(default)]
        before: Option<Record>,
    },
}

impl RecordImage {
    /// Builds an image from loose parts, rejecting combinations that
    /// cannot be applied (an INSERT or UPDATE with no after-image).
    pub fn from_parts(
        op: OpType,
        before: Option<Record>,
        after: Option<Record>,
    ) -> FragResult<Self> {
        match (op, after) {
            (OpType::Insert, Some(after)) => Ok(RecordImage::Insert { after }),
            (OpType::Update, Some(after)) => Ok(RecordImage::Update { before, after }),
            (OpType::Delete, _) => Ok(RecordImage::Delete { before }),
            (op, None) => Err(FragError::invalid_request(format!(
                "{} requires an after-image",
                op
            ))),
        }
    }

    pub fn op_type(&self) -> OpType {
        match self {
            RecordImage::Insert { .. } => OpType::Insert,
            RecordImage::Update { .. } => OpType::Update,
            RecordImage::Delete { .. } => OpType::Delete,
        }
    }

    pub fn before(&self) -> Option<&Record> {
        match self {
            RecordImage::Insert { .. } => None,
            RecordImage::Update { before, .. } | RecordImage::Delete { before } => {
                before.as_ref()
            }
        }
    }

    pub fn after(&self) -> Option<&Record> {
        match self {
            RecordImage::Insert { after } | RecordImage::Update { after, .. } => Some(after),
            RecordImage::Delete { .. } => None,
        }
    }

    /// The payload that drives a replay: after-image for INSERT/UPDATE,
    /// before-image for DELETE.
    pub fn operative(&self) -> Option<&Record> {
        self.after().or_else(|| self.before())
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
