//! Cluster
//!
//! Owns the node registry, lock table, recovery log, transaction context
//! and replication engine, and wires them into the write path: lock,
//! local commit, replicate, release.

mod errors;
mod request;
mod service;

pub use errors::{BootError, BootResult};
pub use request::{WriteOp, WriteOutcome, WriteRequest};
pub use service::Cluster;
