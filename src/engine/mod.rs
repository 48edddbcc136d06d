//! Node-local row store
//!
//! Each cluster member runs its own transactional store. The middleware
//! treats it as an opaque relational engine: it issues begin, read,
//! insert, update, delete, commit and rollback, and relies on the store
//! for isolation between transactions on the same node.
//!
//! # Isolation
//!
//! - READ_UNCOMMITTED reads the newest uncommitted write of any transaction
//! - READ_COMMITTED reads the latest committed version at each statement
//! - REPEATABLE_READ reads the version visible at the transaction's read view
//! - SERIALIZABLE adds commit-time validation of every key read or written
//!
//! Nothing here is shared across nodes. Cross-node consistency is the job
//! of the replication engine.

mod errors;
mod row;
mod store;
mod version;

pub use errors::{EngineError, EngineResult};
pub use row::{Column, Row};
pub use store::{EngineTxn, MemoryEngine};
