//! Background recovery scheduler
//!
//! Periodically resolves every pool that has pending recovery log entries.
//! A pass can also be requested early through `trigger`, which the cluster
//! does whenever a direct replication succeeds (a target that just answered
//! is likely to accept its backlog too).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::replicator::ReplicationEngine;
use crate::observability::{Event, Logger};

pub struct RecoveryScheduler {
    trigger: Arc<Notify>,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RecoveryScheduler {
    /// Starts the loop on the current runtime.
    pub fn spawn(engine: Arc<ReplicationEngine>, interval: Duration, trigger: Arc<Notify>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(engine, interval, Arc::clone(&trigger), shutdown_rx));
        Self {
            trigger,
            shutdown_tx,
            handle,
        }
    }

    /// Requests a pass without waiting for the next tick.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stops the loop and waits for an in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

async fn run(
    engine: Arc<ReplicationEngine>,
    period: Duration,
    trigger: Arc<Notify>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    Logger::event(
        Event::SchedulerStart,
        &[("interval_ms", &period.as_millis().to_string())],
    );

    loop {
        let reason = tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => "interval",
            _ = trigger.notified() => "trigger",
        };
        let reports = engine.resolve_all().await;
        let resolved: usize = reports.iter().map(|r| r.resolved).sum();
        Logger::event(
            Event::SchedulerTick,
            &[
                ("pools", &reports.len().to_string()),
                ("reason", reason),
                ("resolved", &resolved.to_string()),
            ],
        );
    }

    Logger::event(Event::SchedulerStop, &[]);
}
