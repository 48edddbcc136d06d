//! Replication and recovery across node outages
//!
//! - a write whose peer is down commits locally and lands in the source's log
//! - resolving after the peer returns converges both replicas
//! - writes to a key with a backlog are queued behind it, in order
//! - a newer write from the other replica retires an older backlog
//! - the checkpoint only moves when a whole resolve run succeeds
//! - the log survives a restart and resolves afterwards

use std::path::Path;

use tempfile::TempDir;

use fragdb::cluster::{Cluster, WriteOp, WriteOutcome, WriteRequest};
use fragdb::config::ClusterConfig;
use fragdb::errors::FragError;
use fragdb::fragmentation::replication_target;
use fragdb::model::Record;
use fragdb::node::NodeId;
use fragdb::recovery_log::ReplicationStatus;
use fragdb::transaction::IsolationLevel;

// =============================================================================
// Helpers
// =============================================================================

fn open(dir: &Path) -> Cluster {
    let mut config = ClusterConfig::for_data_dir(dir);
    config.replication.probe_timeout_ms = 100;
    config.replication.connect_timeout_ms = 100;
    Cluster::open(config).expect("cluster should open")
}

fn committed(cluster: &Cluster, node: NodeId, key: i64) -> Option<Record> {
    cluster
        .registry()
        .pool(node)
        .engine()
        .committed(key)
        .map(|row| Record::from_row(&row).expect("row decodes"))
}

fn title_of(cluster: &Cluster, node: NodeId, key: i64) -> Option<String> {
    committed(cluster, node, key).and_then(|r| r.primary_title)
}

async fn update(cluster: &Cluster, source: NodeId, key: i64, title: &str) -> WriteOutcome {
    let request = WriteRequest::new(source, key, WriteOp::Update(Record::titled(title)))
        .with_isolation(IsolationLevel::ReadCommitted);
    cluster.write(request).await.expect("local write succeeds")
}

// =============================================================================
// Deferred replication
// =============================================================================

#[tokio::test]
async fn test_write_with_target_down_is_logged_on_source() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(2, &Record::titled("Title 2")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node1);
    let outcome = update(&cluster, NodeId::Node2, 2, "Updated on node2").await;

    assert_eq!(outcome, WriteOutcome::Deferred { log_id: Some(1) });
    assert_eq!(title_of(&cluster, NodeId::Node2, 2).as_deref(), Some("Updated on node2"));
    assert_eq!(title_of(&cluster, NodeId::Node1, 2).as_deref(), Some("Title 2"));

    let pending = cluster.pending(NodeId::Node2);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, 2);
    assert_eq!(pending[0].replication_status, ReplicationStatus::Pending);
    assert_eq!(
        pending[0].before().and_then(|r| r.primary_title.as_deref()),
        Some("Title 2")
    );
    assert!(cluster.pending(NodeId::Node1).is_empty());
}

#[tokio::test]
async fn test_write_with_source_down_fails_without_log() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(1, &Record::titled("Title 1")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node3);
    let request = WriteRequest::new(NodeId::Node3, 1, WriteOp::Update(Record::titled("x")));
    let err = cluster.write(request).await.unwrap_err();

    assert!(matches!(err, FragError::NodeUnreachable { node: NodeId::Node3, .. }));
    assert!(cluster.pending(NodeId::Node3).is_empty());
    assert_eq!(cluster.locks().locked_resources(), 0);
}

#[tokio::test]
async fn test_resolve_converges_replicas() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(2, &Record::titled("Title 2")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node1);
    update(&cluster, NodeId::Node2, 2, "Updated on node2").await;

    // Still down: nothing resolves and the checkpoint holds.
    let report = cluster.resolve_pending(NodeId::Node2).await;
    assert!(!report.all_succeeded());
    assert_eq!(report.checkpoint_after, 0);
    assert_eq!(cluster.pending(NodeId::Node2).len(), 1);

    cluster.registry().grant_access(NodeId::Node1);
    let report = cluster.resolve_pending(NodeId::Node2).await;
    assert!(report.all_succeeded());
    assert_eq!(report.resolved, 1);
    assert_eq!(report.checkpoint_after, 1);
    assert!(cluster.pending(NodeId::Node2).is_empty());
    assert_eq!(committed(&cluster, NodeId::Node1, 2), committed(&cluster, NodeId::Node2, 2));
}

#[tokio::test]
async fn test_backlogged_key_is_queued_in_order() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(4, &Record::titled("v0")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node2);
    update(&cluster, NodeId::Node1, 4, "v1").await;
    cluster.registry().grant_access(NodeId::Node2);

    // node2 is back, but key 4 still has a backlog on node1.
    let outcome = update(&cluster, NodeId::Node1, 4, "v2").await;
    assert_eq!(outcome, WriteOutcome::Deferred { log_id: Some(2) });
    assert_eq!(title_of(&cluster, NodeId::Node2, 4).as_deref(), Some("v0"));

    let report = cluster.resolve_pending(NodeId::Node1).await;
    assert_eq!(report.resolved, 2);
    assert_eq!(title_of(&cluster, NodeId::Node2, 4).as_deref(), Some("v2"));

    // With the backlog gone, writes replicate directly again.
    let outcome = update(&cluster, NodeId::Node1, 4, "v3").await;
    assert_eq!(outcome, WriteOutcome::Replicated { target: NodeId::Node2 });
    assert_eq!(title_of(&cluster, NodeId::Node2, 4).as_deref(), Some("v3"));
}

#[tokio::test]
async fn test_delete_replicates_through_recovery() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(7, &Record::titled("Title 7")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node3);
    let outcome = cluster
        .write(WriteRequest::new(NodeId::Node1, 7, WriteOp::Delete))
        .await
        .unwrap();
    assert!(!outcome.is_replicated());
    assert!(committed(&cluster, NodeId::Node1, 7).is_none());
    assert!(committed(&cluster, NodeId::Node3, 7).is_some());

    cluster.registry().grant_access(NodeId::Node3);
    assert!(cluster.resolve_pending(NodeId::Node1).await.all_succeeded());
    assert!(committed(&cluster, NodeId::Node3, 7).is_none());
}

// =============================================================================
// Checkpoint safety
// =============================================================================

#[tokio::test]
async fn test_partial_resolve_holds_checkpoint() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(1, &Record::titled("Title 1")).await.unwrap();
    cluster.seed(2, &Record::titled("Title 2")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node2);
    cluster.registry().revoke_access(NodeId::Node3);
    update(&cluster, NodeId::Node1, 2, "even").await;
    update(&cluster, NodeId::Node1, 1, "odd").await;
    assert_eq!(cluster.pending(NodeId::Node1).len(), 2);

    // Only the odd fragment comes back.
    cluster.registry().grant_access(NodeId::Node3);
    let report = cluster.resolve_pending(NodeId::Node1).await;
    assert_eq!(report.resolved, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].key, 2);
    assert_eq!(report.checkpoint_after, 0);
    assert_eq!(cluster.log().checkpoint(NodeId::Node1), 0);
    assert_eq!(title_of(&cluster, NodeId::Node3, 1).as_deref(), Some("odd"));

    let pending = cluster.pending(NodeId::Node1);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, 2);

    cluster.registry().grant_access(NodeId::Node2);
    let report = cluster.resolve_pending(NodeId::Node1).await;
    assert!(report.all_succeeded());
    assert_eq!(report.checkpoint_after, 2);
}

#[tokio::test]
async fn test_resolve_with_nothing_pending_is_noop() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    let report = cluster.resolve_pending(NodeId::Node2).await;
    assert_eq!(report.scanned, 0);
    assert!(report.all_succeeded());
    assert_eq!(report.checkpoint_after, 0);
}

// =============================================================================
// Concurrency with new writes
// =============================================================================

#[tokio::test]
async fn test_resolve_concurrent_with_writes_converges() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(2, &Record::titled("v0")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node2);
    for i in 1..=3 {
        update(&cluster, NodeId::Node1, 2, &format!("v{}", i)).await;
    }
    cluster.registry().grant_access(NodeId::Node2);

    let writes = async {
        for i in 4..=6 {
            let request =
                WriteRequest::new(NodeId::Node1, 2, WriteOp::Update(Record::titled(format!("v{}", i))));
            match cluster.write(request).await {
                Ok(_) | Err(FragError::LockConflict { .. }) => {}
                Err(e) => panic!("unexpected write error: {}", e),
            }
            tokio::task::yield_now().await;
        }
    };
    let resolve = cluster.resolve_pending(NodeId::Node1);
    let ((), _) = tokio::join!(writes, resolve);

    for _ in 0..5 {
        if cluster.pending(NodeId::Node1).is_empty() {
            break;
        }
        cluster.resolve_pending(NodeId::Node1).await;
    }

    assert!(cluster.pending(NodeId::Node1).is_empty());
    assert_eq!(committed(&cluster, NodeId::Node1, 2), committed(&cluster, NodeId::Node2, 2));
    assert_eq!(cluster.locks().locked_resources(), 0);
}

#[tokio::test]
async fn test_write_on_other_replica_overrides_backlog() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(2, &Record::titled("v0")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node2);
    let outcome = update(&cluster, NodeId::Node1, 2, "v1").await;
    assert_eq!(outcome, WriteOutcome::Deferred { log_id: Some(1) });
    cluster.registry().grant_access(NodeId::Node2);

    let outcome = update(&cluster, NodeId::Node2, 2, "v2").await;
    assert_eq!(outcome, WriteOutcome::Replicated { target: NodeId::Node1 });

    cluster.resolve_pending(NodeId::Node1).await;
    cluster.resolve_pending(NodeId::Node2).await;

    assert!(cluster.pending(NodeId::Node1).is_empty());
    assert!(cluster.pending(NodeId::Node2).is_empty());
    assert_eq!(title_of(&cluster, NodeId::Node1, 2).as_deref(), Some("v2"));
    assert_eq!(title_of(&cluster, NodeId::Node2, 2).as_deref(), Some("v2"));
}

async fn cross_backlog(cluster: &Cluster) {
    cluster.seed(2, &Record::titled("v0")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node2);
    update(cluster, NodeId::Node1, 2, "v1").await;
    cluster.registry().grant_access(NodeId::Node2);

    cluster.registry().revoke_access(NodeId::Node1);
    update(cluster, NodeId::Node2, 2, "v2").await;
    cluster.registry().grant_access(NodeId::Node1);

    assert_eq!(cluster.pending(NodeId::Node1).len(), 1);
    assert_eq!(cluster.pending(NodeId::Node2).len(), 1);
}

#[tokio::test]
async fn test_cross_source_backlogs_converge_in_either_order() {
    for order in [[NodeId::Node1, NodeId::Node2], [NodeId::Node2, NodeId::Node1]] {
        let temp = TempDir::new().expect("tempdir");
        let cluster = open(temp.path());
        cross_backlog(&cluster).await;

        for pool in order {
            assert!(cluster.resolve_pending(pool).await.all_succeeded());
        }

        assert!(cluster.pending(NodeId::Node1).is_empty());
        assert!(cluster.pending(NodeId::Node2).is_empty());
        assert_eq!(title_of(&cluster, NodeId::Node1, 2).as_deref(), Some("v2"));
        assert_eq!(title_of(&cluster, NodeId::Node2, 2).as_deref(), Some("v2"));
    }
}

#[tokio::test]
async fn test_cross_source_backlog_survives_restart() {
    let temp = TempDir::new().expect("tempdir");
    {
        let cluster = open(temp.path());
        cross_backlog(&cluster).await;
        cluster.shutdown().await;
    }

    // Node stores start empty; only the logs carry over.
    let cluster = open(temp.path());
    cluster.resolve_pending(NodeId::Node1).await;
    cluster.resolve_pending(NodeId::Node2).await;
    assert_eq!(title_of(&cluster, NodeId::Node1, 2).as_deref(), Some("v2"));
    drop(cluster);

    let cluster = open(temp.path());
    assert!(cluster.pending(NodeId::Node1).is_empty());
    assert!(cluster.pending(NodeId::Node2).is_empty());
    assert_eq!(cluster.log().checkpoint(NodeId::Node1), 1);
}

#[tokio::test]
async fn test_resolve_concurrent_with_writes_from_other_replica_converges() {
    let temp = TempDir::new().expect("tempdir");
    let cluster = open(temp.path());
    cluster.seed(2, &Record::titled("v0")).await.unwrap();

    cluster.registry().revoke_access(NodeId::Node2);
    for i in 1..=3 {
        update(&cluster, NodeId::Node1, 2, &format!("central-{}", i)).await;
    }
    cluster.registry().grant_access(NodeId::Node2);

    let writes = async {
        for i in 1..=3 {
            let request = WriteRequest::new(
                NodeId::Node2,
                2,
                WriteOp::Update(Record::titled(format!("fragment-{}", i))),
            );
            match cluster.write(request).await {
                Ok(_) | Err(FragError::LockConflict { .. }) => {}
                Err(e) => panic!("unexpected write error: {}", e),
            }
            tokio::task::yield_now().await;
        }
    };
    let resolve = cluster.resolve_pending(NodeId::Node1);
    let ((), _) = tokio::join!(writes, resolve);

    for _ in 0..5 {
        if cluster.pending(NodeId::Node1).is_empty() && cluster.pending(NodeId::Node2).is_empty() {
            break;
        }
        cluster.resolve_pending(NodeId::Node1).await;
        cluster.resolve_pending(NodeId::Node2).await;
    }

    assert!(cluster.pending(NodeId::Node1).is_empty());
    assert!(cluster.pending(NodeId::Node2).is_empty());
    assert_eq!(committed(&cluster, NodeId::Node1, 2), committed(&cluster, NodeId::Node2, 2));
    assert_eq!(cluster.locks().locked_resources(), 0);
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test]
async fn test_pending_entries_survive_restart() {
    let temp = TempDir::new().expect("tempdir");
    {
        let cluster = open(temp.path());
        cluster.seed(3, &Record::titled("Title 3")).await.unwrap();
        cluster.registry().revoke_access(NodeId::Node1);
        update(&cluster, NodeId::Node3, 3, "Updated on node3").await;
        assert_eq!(cluster.pending(NodeId::Node3).len(), 1);
        cluster.shutdown().await;
    }

    let cluster = open(temp.path());
    let pending = cluster.pending(NodeId::Node3);
    assert_eq!(pending.len(), 1);
    assert_eq!(replication_target(pending[0].pool, pending[0].key), NodeId::Node1);

    let report = cluster.resolve_pending(NodeId::Node3).await;
    assert!(report.all_succeeded());
    assert_eq!(title_of(&cluster, NodeId::Node1, 3).as_deref(), Some("Updated on node3"));
    drop(cluster);

    let cluster = open(temp.path());
    assert!(cluster.pending(NodeId::Node3).is_empty());
    assert_eq!(cluster.log().checkpoint(NodeId::Node3), 1);
}
