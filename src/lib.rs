//! fragdb - a three-node, parity-partitioned record store
//!
//! node1 holds every record; node2 holds the even keys and node3 the odd
//! ones. Writes commit locally and are replicated to the key's other
//! holder. A write the peer did not confirm goes to the source node's
//! durable recovery log and is replayed later, in order, until it lands.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fragmentation;
pub mod http_server;
pub mod lock;
pub mod model;
pub mod node;
pub mod observability;
pub mod recovery_log;
pub mod replication;
pub mod simulation;
pub mod transaction;
