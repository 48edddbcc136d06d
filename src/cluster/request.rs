//! Write requests and their outcomes

use serde::Serialize;

use crate::model::{OpType, Record};
use crate::node::NodeId;
use crate::transaction::IsolationLevel;

/// The local operation a write performs on its source node.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(Record),
    /// Replaces every field of an existing record.
    Update(Record),
    Delete,
}

impl WriteOp {
    pub fn op_type(&self) -> OpType {
        match self {
            Self::Insert(_) => OpType::Insert,
            Self::Update(_) => OpType::Update,
            Self::Delete => OpType::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub source: NodeId,
    pub key: i64,
    pub op: WriteOp,
    pub isolation: IsolationLevel,
    /// Lock owner id; one is generated when absent.
    pub tx_id: Option<String>,
}

impl WriteRequest {
    pub fn new(source: NodeId, key: i64, op: WriteOp) -> Self {
        Self {
            source,
            key,
            op,
            isolation: IsolationLevel::ReadCommitted,
            tx_id: None,
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }
}

/// A committed local write, and what became of its replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "replication", rename_all = "camelCase")]
pub enum WriteOutcome {
    /// The peer applied the write.
    Replicated { target: NodeId },
    /// The peer did not confirm; the write waits in the source's recovery
    /// log. `log_id` is `None` only when the log append failed too.
    #[serde(rename_all = "camelCase")]
    Deferred { log_id: Option<u64> },
}

impl WriteOutcome {
    pub fn is_replicated(&self) -> bool {
        matches!(self, Self::Replicated { .. })
    }
}
