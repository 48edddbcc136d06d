//! Transactions and isolation levels
//!
//! `TransactionContext::begin(node, isolation)` pins a connection on one
//! node and starts a transaction there. The handle offers read, write
//! (update of an existing record), insert, upsert and delete, and ends in
//! `commit` or `rollback`. A dropped handle rolls back.

mod context;
mod isolation;

pub use context::{Transaction, TransactionContext};
pub use isolation::IsolationLevel;

/// Fresh identifier for an application-level transaction.
pub fn new_tx_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
