//! Outage and recovery scenarios
//!
//! Case 1 cuts off node1 and writes on both fragments; case 2 restores it
//! and resolves the fragments' logs. Cases 3 and 4 do the same in the other
//! direction: both fragments cut off while node1 writes, then restored and
//! node1's log resolved. Cases 1 and 3 restore access everywhere before
//! starting; cases 2 and 4 pick up whatever state the previous case left.

use serde_json::{json, Value};

use super::concurrency::baseline;
use super::report::{to_value, LogLine, SimulationReport};
use crate::cluster::{Cluster, WriteOp, WriteOutcome, WriteRequest};
use crate::errors::{FragError, FragResult};
use crate::fragmentation::{owner_of, replication_target};
use crate::model::Record;
use crate::node::NodeId;
use crate::observability::{Event, Logger};
use crate::recovery_log::RecoveryLogEntry;

/// Key written on node2 (and central) during recovery cases.
pub const EVEN_KEY: i64 = 2;
/// Key written on node3 (and central) during recovery cases.
pub const ODD_KEY: i64 = 1;

/// Runs recovery case `case` (1..=4).
pub async fn run_recovery_case(cluster: &Cluster, case: u8) -> FragResult<SimulationReport> {
    if !(1..=4).contains(&case) {
        return Err(FragError::invalid_request(format!(
            "missing or invalid case param (1..4): {}",
            case
        )));
    }
    Logger::event(
        Event::SimulationStart,
        &[("case", &case.to_string()), ("kind", "recovery")],
    );

    let mut report = SimulationReport::new(case, None);
    match case {
        1 => {
            prepare(cluster).await?;
            fragments_write_while_central_down(cluster, &mut report).await;
        }
        2 => central_recovers(cluster, &mut report).await,
        3 => {
            prepare(cluster).await?;
            central_writes_while_fragments_down(cluster, &mut report).await;
        }
        _ => fragments_recover(cluster, &mut report).await,
    }

    Logger::event(
        Event::SimulationComplete,
        &[
            ("case", &case.to_string()),
            ("kind", "recovery"),
            ("lines", &report.replication_log.len().to_string()),
        ],
    );
    Ok(report)
}

async fn prepare(cluster: &Cluster) -> FragResult<()> {
    cluster.registry().grant_all();
    for key in [EVEN_KEY, ODD_KEY] {
        cluster.ensure_seeded(key, &baseline(key)).await?;
    }
    Ok(())
}

fn pending_value(entries: &[RecoveryLogEntry]) -> Value {
    to_value(&entries)
}

fn pending_line(
    cluster: &Cluster,
    transaction_id: String,
    operation: &str,
    pool: NodeId,
) -> LogLine {
    let pending = cluster.pending(pool);
    let status = if pending.is_empty() { "NONE" } else { "PENDING" };
    LogLine::new(transaction_id, operation, pool, status).details(pending_value(&pending))
}

fn committed(cluster: &Cluster, node: NodeId, key: i64) -> Option<Record> {
    cluster
        .registry()
        .pool(node)
        .engine()
        .committed(key)
        .and_then(|row| Record::from_row(&row).ok())
}

/// Updates `key` on `source` through the normal write path and reports
/// whether the peer took it.
async fn update_and_report(
    cluster: &Cluster,
    report: &mut SimulationReport,
    source: NodeId,
    key: i64,
    transaction_id: String,
) {
    let target = replication_target(source, key);
    let before = match committed(cluster, source, key) {
        Some(record) => record,
        None => {
            report.line(LogLine::new(transaction_id, "UPDATE", source, "SKIPPED_NO_ROW"));
            return;
        }
    };
    let after = before.with_primary_title(format!("Updated on {}", source));
    let request = WriteRequest::new(source, key, WriteOp::Update(after))
        .with_isolation(cluster.config().default_isolation)
        .with_tx_id(transaction_id.as_str());

    let line = match cluster.write(request).await {
        Ok(WriteOutcome::Replicated { target }) => {
            LogLine::new(transaction_id, "UPDATE", target, "OK")
        }
        Ok(WriteOutcome::Deferred { log_id }) => {
            let message = match log_id {
                Some(id) => format!("replication to {} deferred as log entry {}", target, id),
                None => format!("replication to {} failed and was not logged", target),
            };
            LogLine::new(transaction_id, "UPDATE", target, "FAILED").message(message)
        }
        Err(e) => LogLine::failed(transaction_id, "UPDATE", source, &e),
    };
    report.line(line);
}

async fn fragments_write_while_central_down(cluster: &Cluster, report: &mut SimulationReport) {
    cluster.registry().revoke_access(NodeId::Node1);
    report.node(NodeId::Node1, "REVOKED_ALL", None);

    for (source, key) in [(NodeId::Node2, EVEN_KEY), (NodeId::Node3, ODD_KEY)] {
        let label = format!("{}-{}", source, key);
        update_and_report(cluster, report, source, key, label.clone()).await;
        report.line(pending_line(cluster, label, "PENDING_CHECK", source));
    }

    report.node(NodeId::Node2, "OK", None);
    report.node(NodeId::Node3, "OK", None);
}

async fn central_recovers(cluster: &Cluster, report: &mut SimulationReport) {
    cluster.registry().grant_access(NodeId::Node1);
    report.node(NodeId::Node1, "GRANTED", None);

    for source in [NodeId::Node2, NodeId::Node3] {
        resolve_and_report(cluster, report, source, NodeId::Node1.to_string()).await;
    }

    for key in [EVEN_KEY, ODD_KEY] {
        report.node(NodeId::Node1, "OK", Some(to_value(&committed(cluster, NodeId::Node1, key))));
    }
    report.node(NodeId::Node2, "OK", None);
    report.node(NodeId::Node3, "OK", None);
}

async fn central_writes_while_fragments_down(cluster: &Cluster, report: &mut SimulationReport) {
    cluster.registry().revoke_access(NodeId::Node2);
    cluster.registry().revoke_access(NodeId::Node3);
    report.node(NodeId::Node2, "REVOKED_ALL", None);
    report.node(NodeId::Node3, "REVOKED_ALL", None);

    for key in [EVEN_KEY, ODD_KEY] {
        let label = format!("{}-{}", NodeId::Node1, key);
        update_and_report(cluster, report, NodeId::Node1, key, label.clone()).await;
        report.line(pending_line(
            cluster,
            format!("{}-pending", label),
            "PENDING_LIST",
            NodeId::Node1,
        ));
    }

    report.node(NodeId::Node1, "OK", None);
}

async fn fragments_recover(cluster: &Cluster, report: &mut SimulationReport) {
    cluster.registry().grant_access(NodeId::Node2);
    cluster.registry().grant_access(NodeId::Node3);
    report.node(NodeId::Node2, "OK", None);
    report.node(NodeId::Node3, "OK", None);

    let targets = format!("{}|{}", NodeId::Node2, NodeId::Node3);
    resolve_and_report(cluster, report, NodeId::Node1, targets).await;

    report.node(NodeId::Node1, "OK", None);
    for key in [EVEN_KEY, ODD_KEY] {
        let owner = owner_of(key);
        report.node(owner, "OK", Some(to_value(&committed(cluster, owner, key))));
    }
}

/// Snapshots `pool`'s pending entries, resolves them, and snapshots again.
async fn resolve_and_report(
    cluster: &Cluster,
    report: &mut SimulationReport,
    pool: NodeId,
    targets: String,
) {
    report.line(pending_line(
        cluster,
        format!("{}-beforeResolve", pool),
        "PENDING_LIST",
        pool,
    ));

    let outcome = cluster.resolve_pending(pool).await;
    let mut line = if outcome.all_succeeded() {
        LogLine::new(format!("{}-resolve", pool), "RESOLVE", targets, "RESOLVE_ATTEMPTED")
    } else {
        let reasons: Vec<String> = outcome
            .failures
            .iter()
            .map(|f| format!("log {} (key {}): {}", f.log_id, f.key, f.reason))
            .collect();
        LogLine::new(format!("{}-resolve", pool), "RESOLVE", targets, "RESOLVE_FAILED")
            .message(reasons.join("; "))
    };
    line = line.details(json!({
        "resolved": outcome.resolved,
        "failed": outcome.failed,
        "skipped": outcome.skipped,
        "checkpointBefore": outcome.checkpoint_before,
        "checkpointAfter": outcome.checkpoint_after,
    }));
    report.line(line);

    report.line(pending_line(
        cluster,
        format!("{}-afterResolve", pool),
        "PENDING_LIST",
        pool,
    ));
}
