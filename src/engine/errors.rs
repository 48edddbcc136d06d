//! Engine error types

use thiserror::Error;

use crate::node::NodeId;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by a node's row store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("duplicate key {0}")]
    DuplicateKey(i64),

    #[error("row {key} is held by uncommitted transaction {holder}")]
    WriteConflict { key: i64, holder: u64 },

    #[error("serialization failure: row {key} changed after the transaction began")]
    SerializationFailure { key: i64 },

    #[error("access denied for {0}")]
    AccessDenied(NodeId),

    #[error("connection pool for {0} is closed")]
    PoolClosed(NodeId),

    #[error("injected write fault on {0}")]
    InjectedFault(NodeId),

    #[error("column {column} holds a value of the wrong type")]
    ColumnType { column: String },

    #[error("transaction {0} is no longer active")]
    TxnNotActive(u64),
}
