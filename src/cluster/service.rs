//! The assembled three-node cluster

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use super::errors::BootResult;
use super::request::{WriteOp, WriteOutcome, WriteRequest};
use crate::config::ClusterConfig;
use crate::errors::{FragError, FragResult};
use crate::fragmentation::{replicas_of, resource_for};
use crate::lock::{LockManager, LockMode};
use crate::model::{Record, RecordImage};
use crate::node::{NodeId, NodeRegistry};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::recovery_log::{RecoveryLog, RecoveryLogEntry, ResolveReport};
use crate::replication::{RecoveryScheduler, ReplicationEngine};
use crate::transaction::{new_tx_id, IsolationLevel, TransactionContext};

pub struct Cluster {
    config: ClusterConfig,
    registry: Arc<NodeRegistry>,
    metrics: Arc<MetricsRegistry>,
    locks: Arc<LockManager>,
    log: Arc<RecoveryLog>,
    transactions: TransactionContext,
    replication: Arc<ReplicationEngine>,
    recovery_trigger: Arc<Notify>,
    scheduler: Mutex<Option<RecoveryScheduler>>,
}

impl Cluster {
    /// Builds every subsystem and replays the recovery logs under
    /// `config.data_dir`. The background resolver is not started.
    pub fn open(config: ClusterConfig) -> BootResult<Self> {
        Logger::event(
            Event::BootStart,
            &[("data_dir", &config.data_dir.display().to_string())],
        );
        config.validate()?;

        let registry = Arc::new(NodeRegistry::new(config.pool.max_connections));
        let metrics = Arc::new(MetricsRegistry::new());
        let locks = Arc::new(LockManager::new());
        let log = Arc::new(RecoveryLog::open(
            &config.data_dir,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        )?);
        let transactions = TransactionContext::new(
            Arc::clone(&registry),
            config.replication.connect_timeout(),
            Arc::clone(&metrics),
        );
        let replication = Arc::new(ReplicationEngine::new(
            transactions.clone(),
            Arc::clone(&log),
            Arc::clone(&locks),
            config.replication.clone(),
            Arc::clone(&metrics),
        ));

        let pending: usize = NodeId::ALL
            .iter()
            .map(|pool| log.get_pending_logs(*pool).len())
            .sum();
        Logger::event(Event::BootComplete, &[("pending", &pending.to_string())]);

        Ok(Self {
            config,
            registry,
            metrics,
            locks,
            log,
            transactions,
            replication,
            recovery_trigger: Arc::new(Notify::new()),
            scheduler: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn log(&self) -> &Arc<RecoveryLog> {
        &self.log
    }

    pub fn transactions(&self) -> &TransactionContext {
        &self.transactions
    }

    pub fn replication(&self) -> &Arc<ReplicationEngine> {
        &self.replication
    }

    /// Runs one write end to end.
    ///
    /// 1. take the record's write lock, or fail with `LockConflict`
    /// 2. apply the operation on `source` in a transaction and commit
    /// 3. replicate the committed image to the peer
    ///
    /// A replication failure does not fail the write: the local commit
    /// stands and the outcome is `Deferred`. The lock is released on every
    /// path.
    pub async fn write(&self, request: WriteRequest) -> FragResult<WriteOutcome> {
        let WriteRequest {
            source,
            key,
            op,
            isolation,
            tx_id,
        } = request;
        let tx_id = tx_id.unwrap_or_else(new_tx_id);
        let resource = resource_for(key);

        let _guard = match self.locks.try_lock(&resource, LockMode::Write, &tx_id) {
            Some(guard) => guard,
            None => {
                self.metrics.increment_lock_conflicts();
                return Err(FragError::lock_conflict(resource));
            }
        };

        let image = self.apply_local(source, key, &op, isolation).await?;

        match self.replication.replicate(source, key, &image).await {
            Ok(target) => {
                if self.has_backlog() {
                    self.recovery_trigger.notify_one();
                }
                Ok(WriteOutcome::Replicated { target })
            }
            Err(FragError::ReplicationFailed { log_id, .. }) => {
                Ok(WriteOutcome::Deferred { log_id })
            }
            Err(e) => Err(e),
        }
    }

    async fn apply_local(
        &self,
        source: NodeId,
        key: i64,
        op: &WriteOp,
        isolation: IsolationLevel,
    ) -> FragResult<RecordImage> {
        let mut tx = self.transactions.begin(source, isolation).await?;
        let image = match op {
            WriteOp::Insert(record) => {
                tx.insert(key, record).await?;
                RecordImage::Insert {
                    after: record.clone(),
                }
            }
            WriteOp::Update(record) => {
                let before = tx
                    .read(key)
                    .await?
                    .ok_or(FragError::RecordNotFound { node: source, key })?;
                tx.write(key, record).await?;
                RecordImage::Update {
                    before: Some(before),
                    after: record.clone(),
                }
            }
            WriteOp::Delete => {
                let before = tx.delete(key).await?;
                RecordImage::Delete {
                    before: Some(before),
                }
            }
        };
        tx.commit().await?;
        Ok(image)
    }

    /// Reads `key` on `node` in a transaction of its own.
    pub async fn read(
        &self,
        node: NodeId,
        key: i64,
        isolation: IsolationLevel,
    ) -> FragResult<Record> {
        let mut tx = self.transactions.begin(node, isolation).await?;
        let record = tx.read(key).await?;
        tx.commit().await?;
        record.ok_or(FragError::RecordNotFound { node, key })
    }

    /// Loads a record onto both of its replicas directly, without locking,
    /// logging or replication.
    pub async fn seed(&self, key: i64, record: &Record) -> FragResult<()> {
        for node in replicas_of(key) {
            let mut tx = self
                .transactions
                .begin(node, IsolationLevel::ReadCommitted)
                .await?;
            tx.upsert(key, record).await?;
            tx.commit().await?;
        }
        Ok(())
    }

    /// Seeds `key` only if it is missing on either replica.
    pub async fn ensure_seeded(&self, key: i64, record: &Record) -> FragResult<()> {
        let missing = replicas_of(key)
            .iter()
            .any(|node| self.registry.pool(*node).engine().committed(key).is_none());
        if missing {
            self.seed(key, record).await?;
        }
        Ok(())
    }

    pub fn pending(&self, pool: NodeId) -> Vec<RecoveryLogEntry> {
        self.log.get_pending_logs(pool)
    }

    pub async fn resolve_pending(&self, pool: NodeId) -> ResolveReport {
        self.replication.resolve_pending(pool).await
    }

    fn has_backlog(&self) -> bool {
        NodeId::ALL
            .iter()
            .any(|pool| !self.log.get_pending_logs(*pool).is_empty())
    }

    /// Starts the background resolver if the config enables it. Calling it
    /// again while one is running does nothing.
    pub fn spawn_scheduler(&self) -> bool {
        if !self.config.recovery.scheduler_enabled {
            return false;
        }
        let mut slot = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(RecoveryScheduler::spawn(
                Arc::clone(&self.replication),
                self.config.recovery.resolve_interval(),
                Arc::clone(&self.recovery_trigger),
            ));
        }
        true
    }

    /// Stops the resolver, then closes every node pool.
    pub async fn shutdown(&self) {
        Logger::event(Event::ShutdownStart, &[]);
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        self.registry.shutdown();
        Logger::event(Event::ShutdownComplete, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(temp: &TempDir) -> Cluster {
        Cluster::open(ClusterConfig::for_data_dir(temp.path())).unwrap()
    }

    #[tokio::test]
    async fn test_insert_replicates_to_owner() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);

        let outcome = cluster
            .write(WriteRequest::new(
                NodeId::Node1,
                10,
                WriteOp::Insert(Record::titled("Ten")),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Replicated { target: NodeId::Node2 });

        let copy = cluster
            .read(NodeId::Node2, 10, IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        assert_eq!(copy.primary_title.as_deref(), Some("Ten"));
        assert_eq!(cluster.locks().locked_resources(), 0);
    }

    #[tokio::test]
    async fn test_write_while_lock_held_is_conflict() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);
        assert!(cluster.locks().acquire("record:4", LockMode::Write, "other"));

        let err = cluster
            .write(WriteRequest::new(NodeId::Node1, 4, WriteOp::Delete))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 423);
        assert_eq!(cluster.metrics().snapshot().lock_conflicts, 1);
        assert_eq!(cluster.locks().list_locks("record:4").len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_record_is_not_found() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);
        let err = cluster
            .write(WriteRequest::new(
                NodeId::Node3,
                7,
                WriteOp::Update(Record::titled("x")),
            ))
            .await
            .unwrap_err();
        assert_eq!(err, FragError::RecordNotFound { node: NodeId::Node3, key: 7 });
        assert_eq!(cluster.locks().locked_resources(), 0);
        assert!(cluster.log().entries(NodeId::Node3).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer_defers_write() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);
        cluster.seed(2, &Record::titled("old")).await.unwrap();
        cluster.registry().revoke_access(NodeId::Node2);

        let outcome = cluster
            .write(WriteRequest::new(
                NodeId::Node1,
                2,
                WriteOp::Update(Record::titled("new")),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Deferred { log_id: Some(1) });

        let pending = cluster.pending(NodeId::Node1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].before().and_then(|r| r.primary_title.as_deref()), Some("old"));
    }

    #[tokio::test]
    async fn test_delete_carries_before_image() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);
        cluster.seed(5, &Record::titled("five")).await.unwrap();
        cluster.registry().revoke_access(NodeId::Node1);

        let outcome = cluster
            .write(WriteRequest::new(NodeId::Node3, 5, WriteOp::Delete))
            .await
            .unwrap();
        assert!(!outcome.is_replicated());
        let entry = &cluster.pending(NodeId::Node3)[0];
        assert_eq!(
            entry.image.operative().and_then(|r| r.primary_title.as_deref()),
            Some("five")
        );
    }

    #[tokio::test]
    async fn test_ensure_seeded_leaves_existing_rows() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);
        cluster.seed(1, &Record::titled("first")).await.unwrap();
        cluster.ensure_seeded(1, &Record::titled("second")).await.unwrap();
        let record = cluster
            .read(NodeId::Node3, 1, IsolationLevel::RepeatableRead)
            .await
            .unwrap();
        assert_eq!(record.primary_title.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_pools() {
        let temp = TempDir::new().unwrap();
        let cluster = open(&temp);
        assert!(cluster.spawn_scheduler());
        cluster.shutdown().await;
        assert!(cluster
            .read(NodeId::Node1, 1, IsolationLevel::ReadCommitted)
            .await
            .is_err());
    }
}
