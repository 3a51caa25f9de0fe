//! Poll-timer scheduling for reconciliation features.
//!
//! One task per feature: a `tokio::select!` loop over the interval tick, a
//! manual trigger channel (the immediate-scrape path), and shutdown. Cycle
//! failures are logged and isolated to that tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use encore_reconcile::{CycleReport, ReconcileEngine, ReconcileFeature};

const MAX_START_JITTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub name: &'static str,
    pub interval: Duration,
    /// Random initial delay (up to a tenth of the interval) so features
    /// sharing a remote host do not all fire at the same instant.
    pub start_jitter: bool,
}

impl PollerConfig {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            start_jitter: true,
        }
    }
}

#[derive(Debug)]
pub struct PollerHandle {
    name: &'static str,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests an immediate cycle. A trigger already queued absorbs this
    /// one; the cycle that runs covers both.
    pub fn trigger_now(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Spawns the poll loop for one feature. Requires an active Tokio runtime.
pub fn spawn_reconcile_poller<F>(
    engine: Arc<ReconcileEngine>,
    feature: Arc<F>,
    config: PollerConfig,
) -> Result<PollerHandle>
where
    F: ReconcileFeature + 'static,
{
    if config.interval.is_zero() {
        bail!("poll interval for '{}' must be greater than zero", config.name);
    }
    let handle = tokio::runtime::Handle::try_current()
        .context("reconcile poller requires an active Tokio runtime")?;

    let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let name = config.name;

    let task = handle.spawn(async move {
        if config.start_jitter {
            let ceiling = (config.interval / 10).min(MAX_START_JITTER);
            if !ceiling.is_zero() {
                let jitter =
                    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64));
                tokio::select! {
                    _ = tokio::time::sleep(jitter) => {}
                    _ = &mut shutdown_rx => return,
                }
            }
        }

        let mut interval = tokio::time::interval(config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    run_cycle_isolated(&engine, feature.as_ref(), name).await;
                }
                Some(()) = trigger_rx.recv() => {
                    run_cycle_isolated(&engine, feature.as_ref(), name).await;
                }
                _ = &mut shutdown_rx => break,
            }
        }
        tracing::debug!(poller = name, "poller stopped");
    });

    Ok(PollerHandle {
        name,
        trigger_tx,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

async fn run_cycle_isolated<F: ReconcileFeature>(
    engine: &ReconcileEngine,
    feature: &F,
    name: &'static str,
) {
    match engine.run_cycle(feature).await {
        Ok(report) => log_cycle(name, &report),
        Err(error) => {
            tracing::warn!(poller = name, error = %error, "cycle aborted on storage failure");
        }
    }
}

fn log_cycle(name: &'static str, report: &CycleReport) {
    if report.is_idle() {
        tracing::debug!(poller = name, observed = report.observed, "cycle idle");
    } else {
        tracing::info!(
            poller = name,
            observed = report.observed,
            new_items = report.new_items,
            applied = report.applied,
            failed = report.failed,
            fetch_failed = report.fetch_failed,
            "cycle complete"
        );
    }
}
