//! Recovery log service
//!
//! One log per node, at `<data_dir>/recovery/<node>.log`. Entries are
//! appended with fsync and indexed in memory; the index is rebuilt from
//! disk on open. Each log also carries a checkpoint: the highest entry id
//! known to be resolved, below which nothing is ever rescanned.
//!
//! # Checkpoint rule
//!
//! A resolve run advances the checkpoint only when every entry it looked
//! at succeeded. One failure freezes it for the whole run, so an entry
//! that failed can never end up at or below the checkpoint.
//!
//! The checkpoint is kept in memory. After a restart it is recomputed as
//! the highest id whose every predecessor, itself included, is no longer
//! PENDING.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{TimeZone, Utc};
use serde::Serialize;

use super::entry::{LocalStatus, RecoveryLogEntry, ReplicationStatus};
use super::errors::RecoveryLogResult;
use super::reader::LogReader;
use super::record::LogRecord;
use super::writer::LogWriter;
use crate::errors::{FragError, FragResult};
use crate::model::RecordImage;
use crate::node::{NodeId, NodeRegistry};
use crate::observability::{Event, Logger, MetricsRegistry};

struct PoolLog {
    writer: LogWriter,
    entries: BTreeMap<u64, RecoveryLogEntry>,
    checkpoint: u64,
}

impl PoolLog {
    fn load(path: &Path, pool: NodeId) -> RecoveryLogResult<Self> {
        let mut entries = BTreeMap::new();
        let mut next_log_id = 1;

        if let Some(mut reader) = LogReader::open(path, pool)? {
            for record in reader.read_all()? {
                match record {
                    LogRecord::Append(entry) => {
                        entries.insert(entry.log_id, entry);
                    }
                    LogRecord::Status { log_id, status } => {
                        if let Some(entry) = entries.get_mut(&log_id) {
                            entry.replication_status = status;
                        }
                    }
                }
            }
            next_log_id = reader.last_log_id() + 1;
        }

        let checkpoint = resolved_prefix(&entries);
        Ok(Self {
            writer: LogWriter::open(path, next_log_id)?,
            entries,
            checkpoint,
        })
    }
}

/// Highest id such that no entry at or below it is PENDING.
fn resolved_prefix(entries: &BTreeMap<u64, RecoveryLogEntry>) -> u64 {
    let mut checkpoint = 0;
    for (id, entry) in entries {
        if entry.is_pending() {
            break;
        }
        checkpoint = *id;
    }
    checkpoint
}

/// Outcome of one `resolve_pending_logs` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub pool: NodeId,
    /// Pending entries found above the checkpoint
    pub scanned: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Entries not attempted because an earlier entry for the same key failed
    pub skipped: usize,
    pub checkpoint_before: u64,
    pub checkpoint_after: u64,
    pub failures: Vec<ResolveFailure>,
}

impl ResolveReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveFailure {
    pub log_id: u64,
    pub key: i64,
    pub reason: String,
}

pub struct RecoveryLog {
    dir: PathBuf,
    registry: Arc<NodeRegistry>,
    /// Indexed by `NodeId::index`
    pools: [Mutex<PoolLog>; 3],
    /// Serializes resolve runs per pool
    resolve_gates: [tokio::sync::Mutex<()>; 3],
    /// Last `created_at` handed out, in unix millis, across all pools
    clock: AtomicI64,
    metrics: Arc<MetricsRegistry>,
}

impl RecoveryLog {
    /// Location of a node's log under `data_dir`.
    pub fn path_for(data_dir: &Path, pool: NodeId) -> PathBuf {
        data_dir
            .join("recovery")
            .join(format!("{}.log", pool.as_str()))
    }

    /// Opens all three logs, replaying whatever is on disk.
    pub fn open(
        data_dir: &Path,
        registry: Arc<NodeRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> RecoveryLogResult<Self> {
        let load = |pool: NodeId| -> RecoveryLogResult<Mutex<PoolLog>> {
            let path = Self::path_for(data_dir, pool);
            let log = PoolLog::load(&path, pool).map_err(|e| {
                if e.is_fatal() {
                    Logger::event(
                        Event::LogCorruption,
                        &[("pool", pool.as_str()), ("error", &e.to_string())],
                    );
                }
                e
            })?;
            Logger::event(
                Event::LogLoaded,
                &[
                    ("checkpoint", &log.checkpoint.to_string()),
                    ("entries", &log.entries.len().to_string()),
                    ("pool", pool.as_str()),
                ],
            );
            Ok(Mutex::new(log))
        };

        let pools = [load(NodeId::Node1)?, load(NodeId::Node2)?, load(NodeId::Node3)?];
        let last_stamp = pools
            .iter()
            .filter_map(|pool| {
                let log = pool.lock().unwrap_or_else(PoisonError::into_inner);
                log.entries.values().map(|e| e.created_at.timestamp_millis()).max()
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            dir: data_dir.join("recovery"),
            registry,
            pools,
            resolve_gates: Default::default(),
            clock: AtomicI64::new(last_stamp),
            metrics,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pool_log(&self, pool: NodeId) -> MutexGuard<'_, PoolLog> {
        self.pools[pool.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wall-clock millis, bumped past the last stamp so that entries of
    /// all three logs are strictly ordered by `created_at`.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    fn ensure_writable(&self, pool: NodeId) -> FragResult<()> {
        if self.registry.is_accessible(pool) {
            Ok(())
        } else {
            Err(FragError::log_write_failed(pool, "origin node is unavailable"))
        }
    }

    fn record_write_failure(&self, pool: NodeId, err: &FragError) {
        self.metrics.increment_log_write_failures();
        Logger::event(
            Event::LogAppendFailed,
            &[("error", &err.to_string()), ("pool", pool.as_str())],
        );
    }

    /// Durably records a write that still needs replicating.
    ///
    /// The entry starts locally APPLIED and PENDING replication. Fails with
    /// `LogWriteFailed` when the origin node cannot take the write.
    pub fn log_operation(&self, pool: NodeId, key: i64, image: &RecordImage) -> FragResult<u64> {
        let result = self.ensure_writable(pool).and_then(|()| {
            let mut log = self.pool_log(pool);
            let now = self.next_stamp();
            let entry = RecoveryLogEntry {
                log_id: log.writer.next_log_id(),
                pool,
                key,
                image: image.clone(),
                local_status: LocalStatus::Applied,
                replication_status: ReplicationStatus::Pending,
                created_at: Utc.timestamp_millis_opt(now).single().unwrap_or_else(Utc::now),
            };
            let record = LogRecord::Append(entry.clone());
            log.writer
                .write(&record)
                .map_err(|e| FragError::log_write_failed(pool, e))?;
            log.entries.insert(entry.log_id, entry.clone());
            Ok(entry)
        });

        match result {
            Ok(entry) => {
                self.metrics.increment_log_entries_appended();
                Logger::event(
                    Event::LogAppend,
                    &[
                        ("key", &key.to_string()),
                        ("log_id", &entry.log_id.to_string()),
                        ("op", entry.op_type().as_str()),
                        ("pool", pool.as_str()),
                    ],
                );
                Ok(entry.log_id)
            }
            Err(e) => {
                self.record_write_failure(pool, &e);
                Err(e)
            }
        }
    }

    /// Records a replication-status transition. Setting the status an
    /// entry already has is a no-op.
    pub fn update_replication_status(
        &self,
        pool: NodeId,
        log_id: u64,
        status: ReplicationStatus,
    ) -> FragResult<()> {
        {
            let log = self.pool_log(pool);
            match log.entries.get(&log_id) {
                None => {
                    return Err(FragError::invalid_request(format!(
                        "no recovery log entry {} on {}",
                        log_id, pool
                    )))
                }
                Some(entry) if entry.replication_status == status => return Ok(()),
                Some(_) => {}
            }
        }

        let result = self.ensure_writable(pool).and_then(|()| {
            let mut log = self.pool_log(pool);
            log.writer
                .write(&LogRecord::Status { log_id, status })
                .map_err(|e| FragError::log_write_failed(pool, e))?;
            if let Some(entry) = log.entries.get_mut(&log_id) {
                entry.replication_status = status;
            }
            Ok(())
        });

        match &result {
            Ok(()) => Logger::event(
                Event::LogStatusChange,
                &[
                    ("log_id", &log_id.to_string()),
                    ("pool", pool.as_str()),
                    ("status", status.as_str()),
                ],
            ),
            Err(e) => self.record_write_failure(pool, e),
        }
        result
    }

    /// PENDING entries above the checkpoint, oldest first.
    pub fn get_pending_logs(&self, pool: NodeId) -> Vec<RecoveryLogEntry> {
        let log = self.pool_log(pool);
        log.entries
            .range(log.checkpoint + 1..)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.is_pending())
            .cloned()
            .collect()
    }

    pub fn has_pending_for_key(&self, pool: NodeId, key: i64) -> bool {
        let log = self.pool_log(pool);
        log.entries
            .range(log.checkpoint + 1..)
            .any(|(_, entry)| entry.key == key && entry.is_pending())
    }

    /// PENDING entries of `pool` for `key`, oldest first.
    pub fn pending_for_key(&self, pool: NodeId, key: i64) -> Vec<RecoveryLogEntry> {
        let log = self.pool_log(pool);
        log.entries
            .range(log.checkpoint + 1..)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.key == key && entry.is_pending())
            .cloned()
            .collect()
    }

    pub fn checkpoint(&self, pool: NodeId) -> u64 {
        self.pool_log(pool).checkpoint
    }

    pub fn entry(&self, pool: NodeId, log_id: u64) -> Option<RecoveryLogEntry> {
        self.pool_log(pool).entries.get(&log_id).cloned()
    }

    /// Every entry in the pool's log, oldest first.
    fn is_still_pending(&self, pool: NodeId, log_id: u64) -> bool {
        self.pool_log(pool)
            .entries
            .get(&log_id)
            .map_or(false, RecoveryLogEntry::is_pending)
    }

    pub fn entries(&self, pool: NodeId) -> Vec<RecoveryLogEntry> {
        self.pool_log(pool).entries.values().cloned().collect()
    }

    /// Replays every pending entry of `pool` through `replay`, in id order.
    ///
    /// Successes are marked DONE, failures stay PENDING. Once an entry for
    /// a key fails, later entries for that key are left for the next run so
    /// per-key order is kept. The checkpoint moves past every resolved entry
    /// only if nothing failed. Runs on the same pool never overlap.
    pub async fn resolve_pending_logs<F, Fut>(&self, pool: NodeId, mut replay: F) -> ResolveReport
    where
        F: FnMut(RecoveryLogEntry) -> Fut,
        Fut: Future<Output = FragResult<()>>,
    {
        let _gate = self.resolve_gates[pool.index()].lock().await;
        self.metrics.increment_resolve_runs();

        let checkpoint_before = self.checkpoint(pool);
        let pending = self.get_pending_logs(pool);
        Logger::event(
            Event::ResolveStart,
            &[
                ("checkpoint", &checkpoint_before.to_string()),
                ("pending", &pending.len().to_string()),
                ("pool", pool.as_str()),
            ],
        );

        let mut report = ResolveReport {
            pool,
            scanned: pending.len(),
            resolved: 0,
            failed: 0,
            skipped: 0,
            checkpoint_before,
            checkpoint_after: checkpoint_before,
            failures: Vec::new(),
        };
        let mut failed_keys = HashSet::new();
        let mut highest = checkpoint_before;

        for entry in pending {
            let (log_id, key) = (entry.log_id, entry.key);
            if failed_keys.contains(&key) {
                report.skipped += 1;
                continue;
            }

            // A replay may settle the entry itself, e.g. as SUPERSEDED.
            let outcome = match replay(entry).await {
                Ok(()) if self.is_still_pending(pool, log_id) => {
                    self.update_replication_status(pool, log_id, ReplicationStatus::Done)
                }
                other => other,
            };

            match outcome {
                Ok(()) => {
                    report.resolved += 1;
                    highest = highest.max(log_id);
                }
                Err(e) => {
                    report.failed += 1;
                    failed_keys.insert(key);
                    report.failures.push(ResolveFailure {
                        log_id,
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.all_succeeded() {
            let mut log = self.pool_log(pool);
            // Entries resolved by an earlier, partly failed run count too.
            let advanced = highest.max(resolved_prefix(&log.entries));
            if advanced > log.checkpoint {
                log.checkpoint = advanced;
                drop(log);
                self.metrics.increment_checkpoint_advances();
                Logger::event(
                    Event::CheckpointAdvanced,
                    &[("checkpoint", &advanced.to_string()), ("pool", pool.as_str())],
                );
            }
        } else {
            Logger::event(
                Event::CheckpointHeld,
                &[
                    ("checkpoint", &checkpoint_before.to_string()),
                    ("failed", &report.failed.to_string()),
                    ("pool", pool.as_str()),
                ],
            );
        }

        report.checkpoint_after = self.checkpoint(pool);
        self.metrics.add_entries_resolved(report.resolved as u64);
        self.metrics
            .add_resolve_failures((report.failed + report.skipped) as u64);
        Logger::event(
            Event::ResolveComplete,
            &[
                ("checkpoint", &report.checkpoint_after.to_string()),
                ("failed", &report.failed.to_string()),
                ("pool", pool.as_str()),
                ("resolved", &report.resolved.to_string()),
                ("skipped", &report.skipped.to_string()),
            ],
        );
        report
    }
}
