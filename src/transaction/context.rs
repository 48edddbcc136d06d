//! Transaction context
//!
//! A `Transaction` pins one pooled connection on one node for its whole
//! life. Reads and writes go through the node's store at the isolation
//! level chosen at `begin`. Dropping a transaction that was neither
//! committed nor rolled back rolls it back and returns the connection, so
//! every exit path releases its resources.

use std::sync::Arc;
use std::time::Duration;

use super::isolation::IsolationLevel;
use crate::engine::{EngineError, EngineTxn};
use crate::errors::{FragError, FragResult};
use crate::model::Record;
use crate::node::{NodeId, NodeRegistry, PooledConnection};
use crate::observability::{Event, Logger, MetricsRegistry};

/// Opens transactions against the registry's nodes.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    registry: Arc<NodeRegistry>,
    connect_timeout: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl TransactionContext {
    pub fn new(
        registry: Arc<NodeRegistry>,
        connect_timeout: Duration,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            connect_timeout,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Acquires a connection on `node` and starts a transaction on it.
    pub async fn begin(&self, node: NodeId, isolation: IsolationLevel) -> FragResult<Transaction> {
        let conn = self
            .registry
            .pool(node)
            .acquire(self.connect_timeout)
            .await?;
        let txn = conn
            .begin(isolation)
            .await
            .map_err(|e| engine_error(node, e))?;
        Ok(Transaction {
            node,
            conn,
            txn,
            metrics: Arc::clone(&self.metrics),
        })
    }

    /// `begin` at the engine's default isolation level.
    pub async fn begin_default(&self, node: NodeId) -> FragResult<Transaction> {
        self.begin(node, IsolationLevel::default()).await
    }
}

/// Connectivity failures surface as `NodeUnreachable`; the rest keep
/// their engine error.
fn engine_error(node: NodeId, err: EngineError) -> FragError {
    match err {
        EngineError::AccessDenied(_) | EngineError::PoolClosed(_) => {
            FragError::node_unreachable(node, err.to_string())
        }
        other => FragError::Engine(other),
    }
}

#[derive(Debug)]
pub struct Transaction {
    node: NodeId,
    conn: PooledConnection,
    txn: EngineTxn,
    metrics: Arc<MetricsRegistry>,
}

impl Transaction {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.txn.isolation()
    }

    pub fn id(&self) -> u64 {
        self.txn.id()
    }

    pub fn is_active(&self) -> bool {
        self.txn.is_active()
    }

    pub async fn read(&mut self, key: i64) -> FragResult<Option<Record>> {
        let row = self
            .conn
            .read(&mut self.txn, key)
            .await
            .map_err(|e| engine_error(self.node, e))?;
        row.map(|r| Record::from_row(&r))
            .transpose()
            .map_err(FragError::from)
    }

    /// Updates an existing record. Fails with `RecordNotFound` if absent.
    pub async fn write(&mut self, key: i64, record: &Record) -> FragResult<()> {
        let affected = self
            .conn
            .update(&mut self.txn, key, record.to_row())
            .await
            .map_err(|e| engine_error(self.node, e))?;
        if affected {
            Ok(())
        } else {
            Err(FragError::RecordNotFound {
                node: self.node,
                key,
            })
        }
    }

    pub async fn insert(&mut self, key: i64, record: &Record) -> FragResult<()> {
        self.conn
            .insert(&mut self.txn, key, record.to_row())
            .await
            .map_err(|e| engine_error(self.node, e))
    }

    /// Update if present, insert otherwise.
    pub async fn upsert(&mut self, key: i64, record: &Record) -> FragResult<()> {
        let updated = self
            .conn
            .update(&mut self.txn, key, record.to_row())
            .await
            .map_err(|e| engine_error(self.node, e))?;
        if updated {
            return Ok(());
        }
        self.insert(key, record).await
    }

    /// Deletes a record and returns its before-image.
    pub async fn delete(&mut self, key: i64) -> FragResult<Record> {
        match self.delete_if_exists(key).await? {
            Some(before) => Ok(before),
            None => Err(FragError::RecordNotFound {
                node: self.node,
                key,
            }),
        }
    }

    pub async fn delete_if_exists(&mut self, key: i64) -> FragResult<Option<Record>> {
        let before = self
            .conn
            .delete(&mut self.txn, key)
            .await
            .map_err(|e| engine_error(self.node, e))?;
        before
            .map(|r| Record::from_row(&r))
            .transpose()
            .map_err(FragError::from)
    }

    pub async fn commit(mut self) -> FragResult<()> {
        self.conn
            .commit(&mut self.txn)
            .await
            .map_err(|e| engine_error(self.node, e))?;
        self.metrics.increment_transactions_committed();
        Logger::event(
            Event::TxnCommit,
            &[("node", self.node.as_str()), ("txn", &self.txn.id().to_string())],
        );
        Ok(())
    }

    pub async fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if self.txn.is_active() {
            self.conn.rollback(&mut self.txn);
            self.metrics.increment_transactions_rolled_back();
            Logger::event(
                Event::TxnRollback,
                &[("node", self.node.as_str()), ("txn", &self.txn.id().to_string())],
            );
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.abort();
    }
}
