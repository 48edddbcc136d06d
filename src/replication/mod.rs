//! Replication
//!
//! Every key lives on exactly two nodes: the central node and the fragment
//! that owns its parity. A write committed on one of them is pushed to the
//! other by the `ReplicationEngine`: probe the target, apply the image in a
//! transaction of its own, and park the write in the source's recovery log
//! if either step fails.
//!
//! Parked writes are replayed in log order, per source node, either on
//! demand or by the `RecoveryScheduler`.

mod config;
mod replicator;
mod scheduler;

pub use config::ReplicationConfig;
pub use replicator::ReplicationEngine;
pub use scheduler::RecoveryScheduler;
