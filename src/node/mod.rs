//! Cluster members and their connection pools
//!
//! - `NodeId` / `NodeRole`: the fixed three-member topology
//! - `NodePool`: bounded connections to one member's store, with a
//!   `SELECT 1` liveness probe and access revocation for outage drills
//! - `NodeRegistry`: the three pools, shared by every subsystem

mod id;
mod pool;
mod registry;

pub use id::{NodeId, NodeRole, UnknownNode};
pub use pool::{NodePool, PooledConnection};
pub use registry::NodeRegistry;
