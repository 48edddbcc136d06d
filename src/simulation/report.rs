//! Scenario reports
//!
//! The shape returned by every scenario, concurrency or recovery:
//!
//! ```json
//! {
//!   "case": 2,
//!   "isolation": "READ_COMMITTED",
//!   "nodeStates": [{ "nodeId": "node1", "status": "OK", "result": null }],
//!   "replicationLog": [{ "transactionId": "node1-3", "operation": "UPDATE",
//!                        "node": "node3", "status": "OK" }]
//! }
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::errors::FragError;
use crate::node::NodeId;
use crate::transaction::IsolationLevel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub case: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationLevel>,
    pub node_states: Vec<NodeState>,
    pub replication_log: Vec<LogLine>,
}

impl SimulationReport {
    pub fn new(case: u8, isolation: Option<IsolationLevel>) -> Self {
        Self {
            case,
            isolation,
            node_states: Vec::new(),
            replication_log: Vec::new(),
        }
    }

    pub fn node(&mut self, node_id: NodeId, status: &str, result: Option<Value>) {
        self.node_states.push(NodeState {
            node_id,
            status: status.to_string(),
            result: result.unwrap_or(Value::Null),
        });
    }

    pub fn line(&mut self, line: LogLine) {
        self.replication_log.push(line);
    }

    /// Lines whose status is `status`, in order.
    pub fn lines_with_status<'a>(&'a self, status: &'a str) -> impl Iterator<Item = &'a LogLine> {
        self.replication_log.iter().filter(move |l| l.status == status)
    }

    pub fn states_of(&self, node: NodeId) -> impl Iterator<Item = &NodeState> {
        self.node_states.iter().filter(move |s| s.node_id == node)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub node_id: NodeId,
    pub status: String,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub transaction_id: String,
    pub operation: String,
    /// A node id, or `node2|node3` for a step that touches both fragments.
    pub node: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl LogLine {
    pub fn new(
        transaction_id: impl Into<String>,
        operation: &str,
        node: impl ToString,
        status: &str,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            operation: operation.to_string(),
            node: node.to_string(),
            status: status.to_string(),
            message: None,
            details: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// A line for a failed step, with the error's code as status detail.
    pub fn failed(
        transaction_id: impl Into<String>,
        operation: &str,
        node: impl ToString,
        err: &FragError,
    ) -> Self {
        Self::new(transaction_id, operation, node, status_of(err)).message(err.to_string())
    }
}

/// Report status for an error.
pub fn status_of(err: &FragError) -> &'static str {
    match err {
        FragError::LockConflict { .. } => "LOCK_CONFLICT",
        FragError::RecordNotFound { .. } => "NOT_FOUND",
        FragError::NodeUnreachable { .. } => "UNREACHABLE",
        _ => "FAILED",
    }
}

/// Serializes anything for a report field; unserializable values become
/// `null`.
pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
