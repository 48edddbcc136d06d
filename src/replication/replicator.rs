//! Probe-then-apply replication
//!
//! After a write commits on its source node, the same image is applied on
//! the one other node that holds the key. The target is probed first; if
//! the probe or the apply fails, the write is parked in the source node's
//! recovery log and the caller gets `ReplicationFailed`. Parked entries are
//! replayed later through `resolve_pending`.
//!
//! Applying an image is idempotent: INSERT and UPDATE upsert the
//! after-image, DELETE removes the row if it is still there. Replaying an
//! entry that already reached its target changes nothing.
//!
//! Both holders of a key can owe each other writes at once. Entries are
//! ordered by `created_at` across logs; an image that lands on a node
//! retires that node's older entries for the key, and an entry whose
//! target logged something newer is retired instead of replayed.

use std::sync::Arc;

use futures_util::future::join_all;

use super::config::ReplicationConfig;
use crate::errors::{FragError, FragResult};
use crate::fragmentation::{replication_target, resource_for};
use crate::lock::{LockManager, LockMode};
use crate::model::RecordImage;
use crate::node::NodeId;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::recovery_log::{RecoveryLog, RecoveryLogEntry, ReplicationStatus, ResolveReport};
use crate::transaction::TransactionContext;

pub struct ReplicationEngine {
    transactions: TransactionContext,
    log: Arc<RecoveryLog>,
    locks: Arc<LockManager>,
    config: ReplicationConfig,
    metrics: Arc<MetricsRegistry>,
}

impl ReplicationEngine {
    pub fn new(
        transactions: TransactionContext,
        log: Arc<RecoveryLog>,
        locks: Arc<LockManager>,
        config: ReplicationConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            transactions,
            log,
            locks,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<RecoveryLog> {
        &self.log
    }

    /// Replicates a write that just committed on `source`.
    ///
    /// Returns the node the image was applied on. If `source` still has
    /// unresolved entries for `key`, the write is queued behind them
    /// instead of applied, so the target sees the key's writes in order.
    pub async fn replicate(
        &self,
        source: NodeId,
        key: i64,
        image: &RecordImage,
    ) -> FragResult<NodeId> {
        if self.log.has_pending_for_key(source, key) {
            let target = replication_target(source, key);
            let log_id = self.park(source, key, image);
            self.metrics.increment_replications_deferred();
            return Err(self.deferred(
                source,
                target,
                key,
                log_id,
                "queued behind pending entries for the same key".to_string(),
            ));
        }
        self.replicate_logged(source, key, image, None).await
    }

    /// Replays one recovery log entry, holding the record's write lock so
    /// a concurrent write to the same key cannot interleave with it.
    ///
    /// If the target logged a newer write to the key while cut off from
    /// this entry's source, the entry is superseded instead of applied: the
    /// target already holds the newer value and will push it the other way.
    pub async fn replay_entry(&self, entry: &RecoveryLogEntry) -> FragResult<()> {
        let resource = resource_for(entry.key);
        let tx_id = format!("replay-{}-{}", entry.pool, entry.log_id);
        let _guard = self
            .locks
            .try_lock(&resource, LockMode::Write, &tx_id)
            .ok_or_else(|| FragError::lock_conflict(resource.as_str()))?;

        // Settled since the resolve run took its snapshot.
        let still_pending = self
            .log
            .entry(entry.pool, entry.log_id)
            .map_or(false, |current| current.is_pending());
        if !still_pending {
            return Ok(());
        }

        let target = replication_target(entry.pool, entry.key);
        let overtaken = self
            .log
            .pending_for_key(target, entry.key)
            .iter()
            .any(|newer| newer.created_at > entry.created_at);
        if overtaken {
            return self.supersede(entry.pool, entry.log_id, entry.key);
        }

        self.replicate_logged(entry.pool, entry.key, &entry.image, Some(entry.log_id))
            .await
            .map(|_| ())
    }

    /// Resolves every pending entry in `pool`'s recovery log.
    pub async fn resolve_pending(&self, pool: NodeId) -> ResolveReport {
        self.log
            .resolve_pending_logs(pool, |entry| async move { self.replay_entry(&entry).await })
            .await
    }

    /// Resolves all three logs concurrently. Pools with nothing pending are
    /// skipped.
    pub async fn resolve_all(&self) -> Vec<ResolveReport> {
        let runs = NodeId::ALL
            .into_iter()
            .filter(|pool| !self.log.get_pending_logs(*pool).is_empty())
            .map(|pool| self.resolve_pending(pool));
        join_all(runs).await
    }

    async fn replicate_logged(
        &self,
        source: NodeId,
        key: i64,
        image: &RecordImage,
        log_id: Option<u64>,
    ) -> FragResult<NodeId> {
        let target = replication_target(source, key);
        self.metrics.increment_replications_attempted();
        Logger::event(
            Event::ReplicationStart,
            &[
                ("key", &key.to_string()),
                ("op", image.op_type().as_str()),
                ("source", source.as_str()),
                ("target", target.as_str()),
            ],
        );

        // Whatever the target still owes for this key is older than the
        // image about to land there.
        let outcome = match self.probe(target).await {
            Ok(()) => match self.supersede_pending(target, key) {
                Ok(()) => self.apply(target, key, image).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let failure = match outcome {
            Ok(()) => match log_id {
                Some(id) => self
                    .log
                    .update_replication_status(source, id, ReplicationStatus::Done)
                    .err(),
                None => None,
            },
            Err(e) => Some(e),
        };

        match failure {
            None => {
                self.metrics.increment_replications_applied();
                Logger::event(
                    Event::ReplicationApplied,
                    &[
                        ("key", &key.to_string()),
                        ("source", source.as_str()),
                        ("target", target.as_str()),
                    ],
                );
                Ok(target)
            }
            Some(err) => {
                let log_id = match log_id {
                    Some(id) => {
                        let _ = self.log.update_replication_status(
                            source,
                            id,
                            ReplicationStatus::Pending,
                        );
                        Some(id)
                    }
                    None => self.park(source, key, image),
                };
                self.metrics.increment_replications_deferred();
                Err(self.deferred(source, target, key, log_id, err.to_string()))
            }
        }
    }

    /// Probes `target`, retrying per the configured policy.
    async fn probe(&self, target: NodeId) -> FragResult<()> {
        let pool = self.transactions.registry().pool(target);
        let mut attempt = 0;
        loop {
            match pool.probe(self.config.probe_timeout()).await {
                Ok(()) => return Ok(()),
                Err(_) if attempt < self.config.probe_retries => {
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    self.metrics.increment_probes_failed();
                    Logger::event(
                        Event::NodeProbeFailed,
                        &[("error", &e.to_string()), ("node", target.as_str())],
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn apply(&self, target: NodeId, key: i64, image: &RecordImage) -> FragResult<()> {
        let mut tx = self
            .transactions
            .begin(target, self.config.apply_isolation)
            .await?;
        match image {
            RecordImage::Insert { after } | RecordImage::Update { after, .. } => {
                tx.upsert(key, after).await?
            }
            RecordImage::Delete { .. } => {
                tx.delete_if_exists(key).await?;
            }
        }
        tx.commit().await
    }

    fn supersede_pending(&self, pool: NodeId, key: i64) -> FragResult<()> {
        for stale in self.log.pending_for_key(pool, key) {
            self.supersede(pool, stale.log_id, key)?;
        }
        Ok(())
    }

    fn supersede(&self, pool: NodeId, log_id: u64, key: i64) -> FragResult<()> {
        self.log
            .update_replication_status(pool, log_id, ReplicationStatus::Superseded)?;
        self.metrics.increment_entries_superseded();
        Logger::event(
            Event::ReplicationSuperseded,
            &[
                ("key", &key.to_string()),
                ("log_id", &log_id.to_string()),
                ("pool", pool.as_str()),
            ],
        );
        Ok(())
    }

    /// Logs an unconfirmed write. A failed log write has already been
    /// reported by the log itself; the write simply has no entry.
    fn park(&self, source: NodeId, key: i64, image: &RecordImage) -> Option<u64> {
        self.log.log_operation(source, key, image).ok()
    }

    fn deferred(
        &self,
        source: NodeId,
        target: NodeId,
        key: i64,
        log_id: Option<u64>,
        reason: String,
    ) -> FragError {
        let log_field = log_id.map_or_else(|| "none".to_string(), |id| id.to_string());
        Logger::event(
            Event::ReplicationDeferred,
            &[
                ("key", &key.to_string()),
                ("log_id", &log_field),
                ("reason", &reason),
                ("source", source.as_str()),
                ("target", target.as_str()),
            ],
        );
        FragError::ReplicationFailed {
            source_node: source,
            target,
            key,
            log_id,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::node::NodeRegistry;
    use crate::transaction::IsolationLevel;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        registry: Arc<NodeRegistry>,
        locks: Arc<LockManager>,
        engine: ReplicationEngine,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(NodeRegistry::new(4));
        let metrics = Arc::new(MetricsRegistry::new());
        let log = Arc::new(
            RecoveryLog::open(temp.path(), Arc::clone(&registry), Arc::clone(&metrics)).unwrap(),
        );
        let locks = Arc::new(LockManager::new());
        let config = ReplicationConfig {
            probe_timeout_ms: 100,
            ..Default::default()
        };
        let transactions = TransactionContext::new(
            Arc::clone(&registry),
            config.connect_timeout(),
            Arc::clone(&metrics),
        );
        let engine = ReplicationEngine::new(transactions, log, Arc::clone(&locks), config, metrics);
        Fixture {
            _temp: temp,
            registry,
            locks,
            engine,
        }
    }

    fn title_on(registry: &NodeRegistry, node: NodeId, key: i64) -> Option<String> {
        registry
            .pool(node)
            .engine()
            .committed(key)
            .and_then(|row| Record::from_row(&row).ok())
            .and_then(|r| r.primary_title)
    }

    fn insert(title: &str) -> RecordImage {
        RecordImage::Insert {
            after: Record::titled(title),
        }
    }

    #[tokio::test]
    async fn test_central_write_goes_to_owner() {
        let f = fixture();
        let target = f.engine.replicate(NodeId::Node1, 4, &insert("even")).await.unwrap();
        assert_eq!(target, NodeId::Node2);
        assert_eq!(title_on(&f.registry, NodeId::Node2, 4).as_deref(), Some("even"));
        assert_eq!(title_on(&f.registry, NodeId::Node3, 4), None);
        assert!(f.engine.log().entries(NodeId::Node1).is_empty());
    }

    #[tokio::test]
    async fn test_fragment_write_goes_to_central() {
        let f = fixture();
        let target = f.engine.replicate(NodeId::Node3, 5, &insert("odd")).await.unwrap();
        assert_eq!(target, NodeId::Node1);
        assert_eq!(title_on(&f.registry, NodeId::Node1, 5).as_deref(), Some("odd"));
    }

    #[tokio::test]
    async fn test_unreachable_target_parks_write() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node1);
        let err = f.engine.replicate(NodeId::Node2, 2, &insert("x")).await.unwrap_err();
        match err {
            FragError::ReplicationFailed { log_id, target, .. } => {
                assert_eq!(log_id, Some(1));
                assert_eq!(target, NodeId::Node1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let pending = f.engine.log().get_pending_logs(NodeId::Node2);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, 2);
    }

    #[tokio::test]
    async fn test_failed_apply_parks_write() {
        let f = fixture();
        f.registry.pool(NodeId::Node3).inject_write_faults(1);
        let err = f.engine.replicate(NodeId::Node1, 7, &insert("x")).await.unwrap_err();
        assert_eq!(err.code(), "FRAG_REPLICATION_FAILED");
        assert_eq!(f.engine.log().get_pending_logs(NodeId::Node1).len(), 1);
        assert_eq!(f.registry.pool(NodeId::Node3).engine().pending_intents(), 0);
    }

    #[tokio::test]
    async fn test_write_queued_behind_pending_entry() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node2);
        f.engine.replicate(NodeId::Node1, 2, &insert("v1")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node2);

        let err = f.engine.replicate(NodeId::Node1, 2, &insert("v2")).await.unwrap_err();
        assert!(err.to_string().contains("queued behind"));
        assert_eq!(title_on(&f.registry, NodeId::Node2, 2), None);

        let report = f.engine.resolve_pending(NodeId::Node1).await;
        assert_eq!(report.resolved, 2);
        assert_eq!(title_on(&f.registry, NodeId::Node2, 2).as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_direct_write_supersedes_peer_backlog() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node2);
        f.engine.replicate(NodeId::Node1, 2, &insert("v1")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node2);

        // node2 writes the key again; node1's parked v1 is now stale.
        let target = f.engine.replicate(NodeId::Node2, 2, &insert("v2")).await.unwrap();
        assert_eq!(target, NodeId::Node1);
        assert_eq!(
            f.engine.log().entry(NodeId::Node1, 1).unwrap().replication_status,
            ReplicationStatus::Superseded
        );

        let report = f.engine.resolve_pending(NodeId::Node1).await;
        assert_eq!(report.scanned, 0);
        assert_eq!(title_on(&f.registry, NodeId::Node2, 2), None);
        assert_eq!(title_on(&f.registry, NodeId::Node1, 2).as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_replay_skips_entry_overtaken_on_target() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node2);
        f.engine.replicate(NodeId::Node1, 2, &insert("v1")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node2);
        f.registry.revoke_access(NodeId::Node1);
        f.engine.replicate(NodeId::Node2, 2, &insert("v2")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node1);

        let report = f.engine.resolve_pending(NodeId::Node1).await;
        assert!(report.all_succeeded());
        assert_eq!(report.resolved, 1);
        assert_eq!(title_on(&f.registry, NodeId::Node2, 2), None);
        assert_eq!(
            f.engine.log().entry(NodeId::Node1, 1).unwrap().replication_status,
            ReplicationStatus::Superseded
        );

        let report = f.engine.resolve_pending(NodeId::Node2).await;
        assert_eq!(report.resolved, 1);
        assert_eq!(title_on(&f.registry, NodeId::Node1, 2).as_deref(), Some("v2"));
        assert_eq!(f.engine.log().checkpoint(NodeId::Node1), 1);
    }

    #[tokio::test]
    async fn test_newer_replay_retires_older_backlog_on_target() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node2);
        f.engine.replicate(NodeId::Node1, 2, &insert("v1")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node2);
        f.registry.revoke_access(NodeId::Node1);
        f.engine.replicate(NodeId::Node2, 2, &insert("v2")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node1);

        // Resolving the newer side first retires the older entry on node1.
        f.engine.resolve_pending(NodeId::Node2).await;
        assert!(f.engine.log().get_pending_logs(NodeId::Node1).is_empty());
        assert_eq!(title_on(&f.registry, NodeId::Node1, 2).as_deref(), Some("v2"));
        assert_eq!(title_on(&f.registry, NodeId::Node2, 2), None);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let f = fixture();
        let image = RecordImage::Update {
            before: None,
            after: Record::titled("same"),
        };
        f.engine.replicate(NodeId::Node1, 3, &image).await.unwrap();
        f.engine.replicate(NodeId::Node1, 3, &image).await.unwrap();
        assert_eq!(title_on(&f.registry, NodeId::Node3, 3).as_deref(), Some("same"));

        let delete = RecordImage::Delete { before: None };
        f.engine.replicate(NodeId::Node1, 3, &delete).await.unwrap();
        f.engine.replicate(NodeId::Node1, 3, &delete).await.unwrap();
        assert_eq!(title_on(&f.registry, NodeId::Node3, 3), None);
    }

    #[tokio::test]
    async fn test_replay_conflicts_with_held_write_lock() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node2);
        f.engine.replicate(NodeId::Node1, 6, &insert("x")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node2);

        assert!(f.locks.acquire(&resource_for(6), LockMode::Write, "writer"));
        let report = f.engine.resolve_pending(NodeId::Node1).await;
        assert_eq!(report.failed, 1);
        assert!(report.failures[0].reason.contains("lock conflict"));
        assert_eq!(f.engine.log().checkpoint(NodeId::Node1), 0);

        f.locks.release(&resource_for(6), "writer");
        let report = f.engine.resolve_pending(NodeId::Node1).await;
        assert_eq!(report.resolved, 1);
        assert_eq!(f.engine.log().checkpoint(NodeId::Node1), 1);
        assert_eq!(f.locks.locked_resources(), 0);
    }

    #[tokio::test]
    async fn test_probe_retries_until_exhausted() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(NodeRegistry::new(2));
        let metrics = Arc::new(MetricsRegistry::new());
        let log = Arc::new(
            RecoveryLog::open(temp.path(), Arc::clone(&registry), Arc::clone(&metrics)).unwrap(),
        );
        let config = ReplicationConfig {
            probe_timeout_ms: 20,
            probe_retries: 2,
            retry_backoff_ms: 1,
            apply_isolation: IsolationLevel::Serializable,
            ..Default::default()
        };
        let transactions =
            TransactionContext::new(Arc::clone(&registry), Duration::from_millis(50), Arc::clone(&metrics));
        let engine = ReplicationEngine::new(
            transactions,
            log,
            Arc::new(LockManager::new()),
            config,
            Arc::clone(&metrics),
        );

        registry.revoke_access(NodeId::Node3);
        assert!(engine.replicate(NodeId::Node1, 9, &insert("x")).await.is_err());
        assert_eq!(metrics.snapshot().probes_failed, 1);
        assert_eq!(metrics.snapshot().replications_deferred, 1);
    }

    #[tokio::test]
    async fn test_resolve_all_skips_empty_pools() {
        let f = fixture();
        f.registry.revoke_access(NodeId::Node1);
        f.engine.replicate(NodeId::Node2, 2, &insert("a")).await.unwrap_err();
        f.engine.replicate(NodeId::Node3, 3, &insert("b")).await.unwrap_err();
        f.registry.grant_access(NodeId::Node1);

        let reports = f.engine.resolve_all().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.all_succeeded()));
        assert_eq!(title_on(&f.registry, NodeId::Node1, 2).as_deref(), Some("a"));
        assert_eq!(title_on(&f.registry, NodeId::Node1, 3).as_deref(), Some("b"));
    }
}
