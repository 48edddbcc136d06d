//! The three-node registry
//!
//! Owns one pool per member. Built once at startup and shared by every
//! subsystem; pools are closed together on shutdown.

use std::sync::Arc;
use std::time::Duration;

use super::id::NodeId;
use super::pool::NodePool;
use crate::errors::FragResult;

#[derive(Debug)]
pub struct NodeRegistry {
    /// Indexed by `NodeId::index`
    pools: [Arc<NodePool>; 3],
}

impl NodeRegistry {
    /// Builds three empty nodes, each allowing `max_connections` connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            pools: NodeId::ALL.map(|node| Arc::new(NodePool::new(node, max_connections))),
        }
    }

    pub fn pool(&self, node: NodeId) -> &Arc<NodePool> {
        &self.pools[node.index()]
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<NodePool>> {
        self.pools.iter()
    }

    pub async fn probe(&self, node: NodeId, timeout: Duration) -> FragResult<()> {
        self.pool(node).probe(timeout).await
    }

    pub fn revoke_access(&self, node: NodeId) {
        self.pool(node).revoke_access();
    }

    pub fn grant_access(&self, node: NodeId) {
        self.pool(node).grant_access();
    }

    pub fn grant_all(&self) {
        for pool in &self.pools {
            pool.grant_access();
        }
    }

    pub fn is_accessible(&self, node: NodeId) -> bool {
        self.pool(node).is_accessible()
    }

    /// Closes every pool.
    pub fn shutdown(&self) {
        for pool in &self.pools {
            pool.close();
        }
    }
}
