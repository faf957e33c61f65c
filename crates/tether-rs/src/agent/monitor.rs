//! Background budget monitor.
//!
//! [`PeriodicMonitor`] runs the [`ContextManager`] against the latest
//! conversation snapshot on a fixed interval. It never touches the
//! orchestrator's message list: a reduction is delivered as a
//! [`MonitorReport`] and the orchestrator decides whether to apply it. Each
//! report carries the generation of the snapshot it was computed from, so a
//! report for a list that has since changed can be recognized and dropped.

use super::config::MonitorConfig;
use crate::Message;
use crate::context::manager::{CleanupOutcome, ContextManager};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A read-only view of the conversation at one generation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub generation: u64,
    pub messages: Arc<Vec<Message>>,
}

/// A reduction computed by the monitor.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    /// Generation of the snapshot the reduction was computed from.
    pub generation: u64,
    pub outcome: CleanupOutcome,
}

/// Handle to a running monitor task. Dropping it cancels the task.
#[derive(Debug)]
pub struct PeriodicMonitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicMonitor {
    /// Start the monitor. Must be called from within a tokio runtime.
    ///
    /// Reports arrive on the returned receiver, which holds at most
    /// `config.channel_capacity` pending reports.
    pub fn spawn(
        manager: ContextManager,
        snapshots: watch::Receiver<Snapshot>,
        model_limit: usize,
        config: &MonitorConfig,
    ) -> (Self, mpsc::Receiver<MonitorReport>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            manager,
            snapshots,
            model_limit,
            config.clone(),
            tx,
            cancel.clone(),
        ));
        debug!(
            "Periodic monitor started (every {}s, limit {model_limit})",
            config.interval().as_secs()
        );
        (
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        )
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!("Periodic monitor task ended abnormally: {e}");
        }
        debug!("Periodic monitor stopped");
    }
}

impl Drop for PeriodicMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    manager: ContextManager,
    mut snapshots: watch::Receiver<Snapshot>,
    model_limit: usize,
    config: MonitorConfig,
    tx: mpsc::Sender<MonitorReport>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    let mut last_checked: Option<u64> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if snapshots.has_changed().is_err() {
            debug!("Snapshot sender dropped, stopping monitor");
            break;
        }

        let snapshot = snapshots.borrow_and_update().clone();
        if last_checked == Some(snapshot.generation) {
            trace!("Monitor: generation {} already checked", snapshot.generation);
            continue;
        }
        last_checked = Some(snapshot.generation);

        let outcome = match manager.cleanup_if_needed(&snapshot.messages, model_limit) {
            Ok(Some(outcome)) if outcome.stats.changed => outcome,
            Ok(Some(_)) => {
                debug!(
                    "Monitor: generation {} is over budget but not reducible further",
                    snapshot.generation
                );
                continue;
            }
            Ok(None) => continue,
            Err(e) => {
                warn!("Background reduction failed: {e}");
                continue;
            }
        };
        debug!(
            "Monitor reduced generation {}: {}",
            snapshot.generation,
            outcome.stats.to_log_string()
        );

        let report = MonitorReport {
            generation: snapshot.generation,
            outcome,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(report) => {
                if sent.is_err() {
                    debug!("Monitor report receiver dropped, stopping monitor");
                    break;
                }
            }
        }
    }
}
