//! Concurrency scenarios
//!
//! Three cases run against one odd key (owned by node3), each at a chosen
//! isolation level and with the lock manager either enforced or bypassed:
//!
//! 1. node1 and node3 read the key at the same time
//! 2. node1 updates the key while readers on node1 and node3 look at it,
//!    once before the update commits and once after it has replicated
//! 3. node1 and node3 update the key at the same time
//!
//! Steps run in lockstep phases (every participant begins, then every
//! participant writes, then every participant commits) so the overlap is
//! the same on every run.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::report::{status_of, to_value, LogLine, SimulationReport};
use crate::cluster::Cluster;
use crate::errors::{FragError, FragResult};
use crate::fragmentation::{owner_of, replication_target, resource_for};
use crate::lock::{LockGuard, LockMode};
use crate::model::{Record, RecordImage};
use crate::node::NodeId;
use crate::observability::{Event, Logger};
use crate::transaction::{new_tx_id, IsolationLevel, Transaction};

/// Key every concurrency case works on.
pub const CONCURRENCY_KEY: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    #[default]
    Enforced,
    Bypassed,
}

impl LockPolicy {
    pub fn from_enforced(enforced: bool) -> Self {
        if enforced {
            LockPolicy::Enforced
        } else {
            LockPolicy::Bypassed
        }
    }

    pub fn is_enforced(self) -> bool {
        self == LockPolicy::Enforced
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockPolicy::Enforced => "enforced",
            LockPolicy::Bypassed => "bypassed",
        }
    }
}

/// The record a scenario key is reset to before each case.
pub fn baseline(key: i64) -> Record {
    Record {
        start_year: Some(1999),
        runtime_minutes: Some(94),
        genres: Some("Drama".to_string()),
        ..Record::titled(format!("Title {}", key))
    }
}

/// Runs concurrency case `case` (1..=3).
///
/// Access is restored on every node and the key is reset to its baseline
/// first, so earlier runs do not leak into the result.
pub async fn run_concurrency_case(
    cluster: &Cluster,
    case: u8,
    isolation: IsolationLevel,
    policy: LockPolicy,
) -> FragResult<SimulationReport> {
    if !(1..=3).contains(&case) {
        return Err(FragError::invalid_request(format!(
            "missing or invalid case param (1..3): {}",
            case
        )));
    }
    Logger::event(
        Event::SimulationStart,
        &[
            ("case", &case.to_string()),
            ("isolation", isolation.as_str()),
            ("kind", "concurrency"),
            ("locks", policy.as_str()),
        ],
    );

    cluster.registry().grant_all();
    cluster
        .seed(CONCURRENCY_KEY, &baseline(CONCURRENCY_KEY))
        .await?;

    let mut scenario = Scenario {
        cluster,
        isolation,
        policy,
        key: CONCURRENCY_KEY,
        report: SimulationReport::new(case, Some(isolation)),
    };
    match case {
        1 => scenario.concurrent_reads().await,
        2 => scenario.write_with_readers().await?,
        _ => scenario.concurrent_writes().await?,
    }

    Logger::event(
        Event::SimulationComplete,
        &[
            ("case", &case.to_string()),
            ("kind", "concurrency"),
            ("lines", &scenario.report.replication_log.len().to_string()),
        ],
    );
    Ok(scenario.report)
}

fn error_value(err: &FragError) -> Option<Value> {
    Some(json!({ "error": err.to_string(), "code": err.code() }))
}

struct Reader {
    node: NodeId,
    _guard: Option<LockGuard>,
    tx: Transaction,
    first: Option<FragResult<Option<Record>>>,
}

struct Writer {
    node: NodeId,
    guard: Option<LockGuard>,
    tx: Transaction,
    after: Record,
}

struct Scenario<'a> {
    cluster: &'a Cluster,
    isolation: IsolationLevel,
    policy: LockPolicy,
    key: i64,
    report: SimulationReport,
}

impl Scenario<'_> {
    fn label(&self, node: NodeId) -> String {
        format!("{}-{}", node, self.key)
    }

    fn lock(&self, node: NodeId, mode: LockMode) -> FragResult<Option<LockGuard>> {
        if !self.policy.is_enforced() {
            return Ok(None);
        }
        let resource = resource_for(self.key);
        let tx_id = format!("sim-{}-{}", node, new_tx_id());
        match self.cluster.locks().try_lock(&resource, mode, &tx_id) {
            Some(guard) => Ok(Some(guard)),
            None => {
                self.cluster.metrics().increment_lock_conflicts();
                Err(FragError::lock_conflict(resource))
            }
        }
    }

    fn refuse(&mut self, node: NodeId, operation: &str, err: &FragError) {
        let label = self.label(node);
        self.report.node(node, status_of(err), error_value(err));
        self.report.line(LogLine::failed(label, operation, node, err));
    }

    async fn read_once(&self, node: NodeId) -> FragResult<Option<Record>> {
        let _guard = self.lock(node, LockMode::Read)?;
        let mut tx = self.cluster.transactions().begin(node, self.isolation).await?;
        let record = tx.read(self.key).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Case 1.
    async fn concurrent_reads(&mut self) {
        let nodes = [NodeId::Node1, owner_of(self.key)];
        let results = join_all(nodes.iter().map(|node| self.read_once(*node))).await;

        for (node, result) in nodes.into_iter().zip(results) {
            match result {
                Ok(record) => {
                    let label = self.label(node);
                    self.report.node(node, "OK", Some(to_value(&record)));
                    self.report.line(LogLine::new(label, "READ", node, "OK"));
                }
                Err(e) => self.refuse(node, "READ", &e),
            }
        }
    }

    /// Case 2.
    async fn write_with_readers(&mut self) -> FragResult<()> {
        let key = self.key;
        let writer = NodeId::Node1;
        let writer_label = self.label(writer);

        let write_guard = match self.lock(writer, LockMode::Write) {
            Ok(guard) => guard,
            Err(e) => {
                self.refuse(writer, "UPDATE", &e);
                return Ok(());
            }
        };

        let mut readers = Vec::new();
        for node in [NodeId::Node1, owner_of(key)] {
            match self.lock(node, LockMode::Read) {
                Ok(guard) => {
                    let tx = self.cluster.transactions().begin(node, self.isolation).await?;
                    readers.push(Reader {
                        node,
                        _guard: guard,
                        tx,
                        first: None,
                    });
                }
                Err(e) => self.refuse(node, "READ", &e),
            }
        }

        let mut write_tx = self.cluster.transactions().begin(writer, self.isolation).await?;
        let before = write_tx.read(key).await?;
        let after = before
            .clone()
            .unwrap_or_else(|| baseline(key))
            .with_primary_title("New Title");
        write_tx.write(key, &after).await?;
        self.report
            .line(LogLine::new(writer_label.as_str(), "UPDATE", writer, "UNCOMMITTED"));

        let firsts = join_all(readers.iter_mut().map(|r| r.tx.read(key))).await;
        for (reader, first) in readers.iter_mut().zip(firsts) {
            let line = match &first {
                Ok(record) => LogLine::new(self.label(reader.node), "READ_DURING_WRITE", reader.node, "OK")
                    .details(to_value(record)),
                Err(e) => LogLine::failed(self.label(reader.node), "READ_DURING_WRITE", reader.node, e),
            };
            self.report.line(line);
            reader.first = Some(first);
        }

        let writer_status = match write_tx.commit().await {
            Ok(()) => {
                self.report
                    .line(LogLine::new(writer_label.as_str(), "COMMIT", writer, "OK"));
                let image = RecordImage::Update {
                    before,
                    after: after.clone(),
                };
                let replicated = self.cluster.replication().replicate(writer, key, &image).await;
                let target = owner_of(key);
                self.report.line(match replicated {
                    Ok(target) => LogLine::new(writer_label.as_str(), "UPDATE", target, "OK"),
                    Err(e) => LogLine::failed(writer_label.as_str(), "UPDATE", target, &e),
                });
                "OK"
            }
            Err(e) => {
                self.report
                    .line(LogLine::failed(writer_label.as_str(), "COMMIT", writer, &e));
                "ABORTED"
            }
        };
        drop(write_guard);
        self.report
            .node(writer, writer_status, Some(json!({ "written": to_value(&after) })));

        let seconds = join_all(readers.iter_mut().map(|r| r.tx.read(key))).await;
        for (reader, second) in readers.into_iter().zip(seconds) {
            let Reader { node, tx, first, .. } = reader;
            let label = self.label(node);
            match &second {
                Ok(record) => self.report.line(
                    LogLine::new(label.as_str(), "READ_AFTER_COMMIT", node, "OK").details(to_value(record)),
                ),
                Err(e) => self
                    .report
                    .line(LogLine::failed(label.as_str(), "READ_AFTER_COMMIT", node, e)),
            }

            let status = match tx.commit().await {
                Ok(()) => "OK",
                Err(e) => {
                    self.report.line(LogLine::failed(label.as_str(), "COMMIT", node, &e));
                    "ABORTED"
                }
            };
            let read_value = |r: &Option<FragResult<Option<Record>>>| match r {
                Some(Ok(record)) => to_value(record),
                Some(Err(e)) => json!({ "error": e.to_string() }),
                None => Value::Null,
            };
            self.report.node(
                node,
                status,
                Some(json!({
                    "firstRead": read_value(&first),
                    "secondRead": read_value(&Some(second)),
                })),
            );
        }
        Ok(())
    }

    /// Case 3.
    async fn concurrent_writes(&mut self) -> FragResult<()> {
        let key = self.key;

        let mut writers = Vec::new();
        for node in [NodeId::Node1, owner_of(key)] {
            match self.lock(node, LockMode::Write) {
                Ok(guard) => {
                    let tx = self.cluster.transactions().begin(node, self.isolation).await?;
                    writers.push(Writer {
                        node,
                        guard,
                        tx,
                        after: baseline(key).with_primary_title(format!("Title from {}", node)),
                    });
                }
                Err(e) => self.refuse(node, "UPDATE", &e),
            }
        }

        let writes = join_all(writers.iter_mut().map(|w| async move {
            let before = w.tx.read(key).await?;
            w.tx.write(key, &w.after).await?;
            Ok::<_, FragError>(before)
        }))
        .await;

        let mut staged = Vec::new();
        for (writer, written) in writers.into_iter().zip(writes) {
            match written {
                Ok(before) => staged.push((writer, before)),
                Err(e) => self.refuse(writer.node, "UPDATE", &e),
            }
        }

        let commits = join_all(staged.into_iter().map(|(w, before)| async move {
            let Writer {
                node,
                guard,
                tx,
                after,
            } = w;
            (node, guard, before, after, tx.commit().await)
        }))
        .await;

        let mut committed = Vec::new();
        for (node, guard, before, after, result) in commits {
            match result {
                Ok(()) => {
                    let label = self.label(node);
                    self.report.line(LogLine::new(label, "COMMIT", node, "OK"));
                    committed.push((node, guard, RecordImage::Update { before, after }));
                }
                Err(e) => self.refuse(node, "COMMIT", &e),
            }
        }

        let replication = self.cluster.replication();
        let replicated = join_all(
            committed
                .iter()
                .map(|(node, _, image)| replication.replicate(*node, key, image)),
        )
        .await;
        for ((node, _, _), result) in committed.iter().zip(replicated) {
            let label = self.label(*node);
            let target = replication_target(*node, key);
            self.report.line(match result {
                Ok(target) => LogLine::new(label, "UPDATE", target, "OK"),
                Err(e) => LogLine::failed(label, "UPDATE", target, &e),
            });
        }
        // Locks are held until replication has finished.
        drop(committed);

        let finals: Vec<(NodeId, Option<Record>)> = [NodeId::Node1, owner_of(key)]
            .into_iter()
            .map(|node| {
                let record = self
                    .cluster
                    .registry()
                    .pool(node)
                    .engine()
                    .committed(key)
                    .and_then(|row| Record::from_row(&row).ok());
                (node, record)
            })
            .collect();
        for (node, record) in &finals {
            self.report.node(*node, "OK", Some(to_value(record)));
        }
        let converged = finals[0].1 == finals[1].1;
        let status = if converged { "CONVERGED" } else { "DIVERGED" };
        let nodes = format!("{}|{}", finals[0].0, finals[1].0);
        let values: Vec<Value> = finals.iter().map(|(_, r)| to_value(r)).collect();
        self.report.line(
            LogLine::new(format!("compare-{}", key), "COMPARE", nodes, status)
                .details(Value::Array(values)),
        );
        Ok(())
    }
}
