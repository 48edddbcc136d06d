//! Bounded connection pool for one node
//!
//! A pool hands out at most `max_connections` connections at a time.
//! Every statement issued through a connection is one round trip to the
//! node's store, and each round trip re-checks that the node is still
//! reachable. Revoking access makes every later round trip fail, which is
//! how outages are simulated.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::id::NodeId;
use crate::engine::{EngineError, EngineResult, EngineTxn, MemoryEngine, Row};
use crate::errors::{FragError, FragResult};
use crate::observability::{Event, Logger};
use crate::transaction::IsolationLevel;

#[derive(Debug)]
pub struct NodePool {
    node: NodeId,
    engine: Arc<MemoryEngine>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    accessible: AtomicBool,
    /// Remaining writes that will fail with an injected fault
    write_faults: AtomicU32,
    latency_ms: AtomicU64,
}

impl NodePool {
    pub fn new(node: NodeId, max_connections: usize) -> Self {
        Self::with_engine(Arc::new(MemoryEngine::new(node)), max_connections)
    }

    pub fn with_engine(engine: Arc<MemoryEngine>, max_connections: usize) -> Self {
        Self {
            node: engine.node(),
            engine,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            accessible: AtomicBool::new(true),
            write_faults: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    /// Makes the node refuse every connection and statement.
    pub fn revoke_access(&self) {
        if self.accessible.swap(false, Ordering::SeqCst) {
            Logger::event(Event::NodeAccessRevoked, &[("node", self.node.as_str())]);
        }
    }

    pub fn grant_access(&self) {
        if !self.accessible.swap(true, Ordering::SeqCst) {
            Logger::event(Event::NodeAccessGranted, &[("node", self.node.as_str())]);
        }
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible.load(Ordering::SeqCst)
    }

    /// The next `count` write statements fail with `InjectedFault`.
    pub fn inject_write_faults(&self, count: u32) {
        self.write_faults.store(count, Ordering::SeqCst);
    }

    /// Simulated network delay added to every round trip.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Closes the pool. Outstanding connections finish their statements;
    /// new acquisitions fail.
    pub fn close(&self) {
        if !self.permits.is_closed() {
            self.permits.close();
            Logger::event(Event::NodePoolClosed, &[("node", self.node.as_str())]);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Takes a connection, waiting at most `timeout` for a free slot.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> FragResult<PooledConnection> {
        let permit = match tokio::time::timeout(timeout, self.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(FragError::node_unreachable(self.node, "connection pool closed")),
            Err(_) => {
                return Err(FragError::node_unreachable(
                    self.node,
                    format!("no connection available within {} ms", timeout.as_millis()),
                ))
            }
        };

        if !self.is_accessible() {
            return Err(FragError::node_unreachable(self.node, "access denied"));
        }

        Ok(PooledConnection {
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Liveness probe: connect and run `SELECT 1`, all within `timeout`.
    pub async fn probe(self: &Arc<Self>, timeout: Duration) -> FragResult<()> {
        let attempt = async {
            let conn = self.acquire(timeout).await?;
            conn.ping()
                .await
                .map_err(|e| FragError::node_unreachable(self.node, e.to_string()))
        };
        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(FragError::node_unreachable(
                self.node,
                format!("probe timed out after {} ms", timeout.as_millis()),
            )),
        }
    }

    fn take_write_fault(&self) -> bool {
        self.write_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A checked-out connection. The slot returns to the pool on drop.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<NodePool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn node(&self) -> NodeId {
        self.pool.node
    }

    async fn round_trip(&self) -> EngineResult<()> {
        let latency = self.pool.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.pool.is_closed() {
            return Err(EngineError::PoolClosed(self.pool.node));
        }
        if !self.pool.is_accessible() {
            return Err(EngineError::AccessDenied(self.pool.node));
        }
        Ok(())
    }

    async fn write_round_trip(&self) -> EngineResult<()> {
        self.round_trip().await?;
        if self.pool.take_write_fault() {
            return Err(EngineError::InjectedFault(self.pool.node));
        }
        Ok(())
    }

    /// `SELECT 1`
    pub async fn ping(&self) -> EngineResult<()> {
        self.round_trip().await
    }

    pub async fn begin(&self, isolation: IsolationLevel) -> EngineResult<EngineTxn> {
        self.round_trip().await?;
        Ok(self.pool.engine.begin(isolation))
    }

    pub async fn read(&self, txn: &mut EngineTxn, key: i64) -> EngineResult<Option<Row>> {
        self.round_trip().await?;
        self.pool.engine.read(txn, key)
    }

    pub async fn insert(&self, txn: &mut EngineTxn, key: i64, row: Row) -> EngineResult<()> {
        self.write_round_trip().await?;
        self.pool.engine.insert(txn, key, row)
    }

    pub async fn update(&self, txn: &mut EngineTxn, key: i64, row: Row) -> EngineResult<bool> {
        self.write_round_trip().await?;
        self.pool.engine.update(txn, key, row)
    }

    pub async fn delete(&self, txn: &mut EngineTxn, key: i64) -> EngineResult<Option<Row>> {
        self.write_round_trip().await?;
        self.pool.engine.delete(txn, key)
    }

    pub async fn commit(&self, txn: &mut EngineTxn) -> EngineResult<u64> {
        self.round_trip().await?;
        self.pool.engine.commit(txn)
    }

    /// Rollback never needs the network to succeed: the store drops the
    /// transaction's intents when the session goes away.
    pub fn rollback(&self, txn: &mut EngineTxn) {
        self.pool.engine.rollback(txn);
    }
}
