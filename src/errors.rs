//! Crate-wide error taxonomy
//!
//! Every failure a caller of the middleware can observe maps onto one of
//! these variants. Each variant carries a stable code, an HTTP-equivalent
//! status and a retryability flag so an API layer can render it without
//! inspecting messages.

use thiserror::Error;

use crate::engine::EngineError;
use crate::node::NodeId;

/// Result type used across the middleware.
pub type FragResult<T> = Result<T, FragError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragError {
    // ==================
    // Node errors
    // ==================
    #[error("node {node} unreachable: {reason}")]
    NodeUnreachable { node: NodeId, reason: String },

    // ==================
    // Concurrency errors
    // ==================
    #[error("lock conflict on {resource}")]
    LockConflict { resource: String },

    // ==================
    // Replication errors
    // ==================
    #[error("replication of key {key} from {source_node} to {target} failed: {reason}")]
    ReplicationFailed {
        source_node: NodeId,
        target: NodeId,
        key: i64,
        /// Recovery log entry that now tracks the operation, if one could be written
        log_id: Option<u64>,
        reason: String,
    },

    #[error("recovery log write on {pool} failed: {reason}")]
    LogWriteFailed { pool: NodeId, reason: String },

    // ==================
    // Data errors
    // ==================
    #[error("record {key} not found on {node}")]
    RecordNotFound { node: NodeId, key: i64 },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FragError {
    pub fn node_unreachable(node: NodeId, reason: impl Into<String>) -> Self {
        FragError::NodeUnreachable {
            node,
            reason: reason.into(),
        }
    }

    pub fn lock_conflict(resource: impl Into<String>) -> Self {
        FragError::LockConflict {
            resource: resource.into(),
        }
    }

    pub fn log_write_failed(pool: NodeId, reason: impl ToString) -> Self {
        FragError::LogWriteFailed {
            pool,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        FragError::InvalidRequest(reason.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FragError::NodeUnreachable { .. } => "FRAG_NODE_UNREACHABLE",
            FragError::LockConflict { .. } => "FRAG_LOCK_CONFLICT",
            FragError::ReplicationFailed { .. } => "FRAG_REPLICATION_FAILED",
            FragError::LogWriteFailed { .. } => "FRAG_LOG_WRITE_FAILED",
            FragError::RecordNotFound { .. } => "FRAG_RECORD_NOT_FOUND",
            FragError::Engine(_) => "FRAG_ENGINE_ERROR",
            FragError::InvalidRequest(_) => "FRAG_INVALID_REQUEST",
        }
    }

    /// HTTP-equivalent status for an API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            FragError::NodeUnreachable { .. } => 503,
            FragError::LockConflict { .. } => 423,
            FragError::ReplicationFailed { .. } => 502,
            FragError::LogWriteFailed { .. } => 500,
            FragError::RecordNotFound { .. } => 404,
            FragError::Engine(EngineError::DuplicateKey(_)) => 409,
            FragError::Engine(EngineError::WriteConflict { .. })
            | FragError::Engine(EngineError::SerializationFailure { .. }) => 409,
            FragError::Engine(_) => 500,
            FragError::InvalidRequest(_) => 400,
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FragError::NodeUnreachable { .. }
                | FragError::LockConflict { .. }
                | FragError::Engine(EngineError::WriteConflict { .. })
                | FragError::Engine(EngineError::SerializationFailure { .. })
        )
    }
}
