//! Operational counters
//!
//! Counters only, monotonic, reset on process start. Relaxed atomics are
//! enough: readers only need eventually exact totals.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    replications_attempted: AtomicU64,
    replications_applied: AtomicU64,
    replications_deferred: AtomicU64,
    probes_failed: AtomicU64,
    log_entries_appended: AtomicU64,
    log_write_failures: AtomicU64,
    entries_resolved: AtomicU64,
    entries_superseded: AtomicU64,
    resolve_failures: AtomicU64,
    resolve_runs: AtomicU64,
    checkpoint_advances: AtomicU64,
    lock_conflicts: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(increment_replications_attempted, replications_attempted);
    counter!(increment_replications_applied, replications_applied);
    counter!(increment_replications_deferred, replications_deferred);
    counter!(increment_probes_failed, probes_failed);
    counter!(increment_log_entries_appended, log_entries_appended);
    counter!(increment_log_write_failures, log_write_failures);
    counter!(increment_entries_superseded, entries_superseded);
    counter!(increment_resolve_runs, resolve_runs);
    counter!(increment_checkpoint_advances, checkpoint_advances);
    counter!(increment_lock_conflicts, lock_conflicts);
    counter!(increment_transactions_committed, transactions_committed);
    counter!(increment_transactions_rolled_back, transactions_rolled_back);

    pub fn add_entries_resolved(&self, count: u64) {
        self.entries_resolved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_resolve_failures(&self, count: u64) {
        self.resolve_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            replications_attempted: load(&self.replications_attempted),
            replications_applied: load(&self.replications_applied),
            replications_deferred: load(&self.replications_deferred),
            probes_failed: load(&self.probes_failed),
            log_entries_appended: load(&self.log_entries_appended),
            log_write_failures: load(&self.log_write_failures),
            entries_resolved: load(&self.entries_resolved),
            entries_superseded: load(&self.entries_superseded),
            resolve_failures: load(&self.resolve_failures),
            resolve_runs: load(&self.resolve_runs),
            checkpoint_advances: load(&self.checkpoint_advances),
            lock_conflicts: load(&self.lock_conflicts),
            transactions_committed: load(&self.transactions_committed),
            transactions_rolled_back: load(&self.transactions_rolled_back),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub replications_attempted: u64,
    pub replications_applied: u64,
    pub replications_deferred: u64,
    pub probes_failed: u64,
    pub log_entries_appended: u64,
    pub log_write_failures: u64,
    pub entries_resolved: u64,
    pub entries_superseded: u64,
    pub resolve_failures: u64,
    pub resolve_runs: u64,
    pub checkpoint_advances: u64,
    pub lock_conflicts: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_zeroed() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.replications_attempted, 0);
        assert_eq!(snapshot.entries_resolved, 0);
        assert_eq!(snapshot.lock_conflicts, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsRegistry::new();
        metrics.increment_replications_attempted();
        metrics.increment_replications_attempted();
        metrics.increment_replications_deferred();
        metrics.add_entries_resolved(3);
        metrics.add_resolve_failures(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.replications_attempted, 2);
        assert_eq!(snapshot.replications_deferred, 1);
        assert_eq!(snapshot.entries_resolved, 3);
        assert_eq!(snapshot.resolve_failures, 1);
    }

    #[test]
    fn test_json_export() {
        let metrics = MetricsRegistry::new();
        metrics.increment_checkpoint_advances();
        let json = metrics.to_json();
        assert_eq!(json["checkpoint_advances"], 1);
        assert_eq!(json["log_write_failures"], 0);
    }
}
