//! Continuous reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use driftwatch_core::ApplicationDescriptor;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::reconciler::Reconciler;
use crate::types::CycleSummary;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Continuous reconciliation loop.
///
/// Runs a cycle over every application, sleeps for the interval, and
/// repeats until stopped. Only the sleep is interruptible; a cycle in
/// progress always completes.
pub struct ReconciliationLoop {
    /// The reconciler.
    reconciler: Arc<Reconciler>,
    /// Applications, read-only for the lifetime of the loop.
    apps: Arc<[ApplicationDescriptor]>,
    /// Loop configuration.
    config: LoopConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(
        reconciler: Arc<Reconciler>,
        apps: impl Into<Arc<[ApplicationDescriptor]>>,
        config: LoopConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            apps: apps.into(),
            config,
            stop_rx,
            stop_tx,
        }
    }

    /// Run cycles until stopped. Returns the number of completed cycles.
    pub async fn run(&mut self) -> u64 {
        info!(
            interval_ms = self.config.interval.as_millis(),
            applications = self.apps.len(),
            "Starting reconciliation loop"
        );

        let mut cycles = 0u64;
        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            self.run_once().await;
            cycles = cycles.saturating_add(1);

            tokio::select! {
                () = tokio::time::sleep(self.config.interval) => {
                    debug!(cycle = cycles, "Interval elapsed");
                }
                changed = self.stop_rx.changed() => {
                    // A dropped sender can never stop us again; treat it as a stop.
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cycles, "Reconciliation loop stopped");
        cycles
    }

    /// Run a single reconciliation cycle.
    pub async fn run_once(&self) -> CycleSummary {
        self.reconciler.run_cycle(&self.apps).await
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
