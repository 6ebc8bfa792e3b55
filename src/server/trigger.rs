//! Periodic trigger
//!
//! Runs the orchestrator on a fixed interval while the server is up. The
//! post gate decides whether a tick actually posts, so the interval only
//! bounds how late after the window a post can happen.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::orchestrator::PostOrchestrator;

/// Trigger status information
#[derive(Debug, Clone, Serialize)]
pub struct TriggerStatus {
    pub is_running: bool,
    pub interval_secs: u64,
    pub ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
}

/// Fires the orchestrator on an interval
pub struct ScheduledTrigger {
    orchestrator: Arc<PostOrchestrator>,
    interval: Duration,
    run_on_startup: bool,
    ticks: AtomicU64,
    last_outcome: RwLock<Option<String>>,
    stop_tx: watch::Sender<bool>,
}

impl ScheduledTrigger {
    /// Create a trigger; nothing runs until [`ScheduledTrigger::start`]
    pub fn new(orchestrator: Arc<PostOrchestrator>, config: &ScheduleConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            orchestrator,
            interval: config.interval(),
            run_on_startup: config.run_on_startup,
            ticks: AtomicU64::new(0),
            last_outcome: RwLock::new(None),
            stop_tx,
        }
    }

    /// Run the trigger loop until [`ScheduledTrigger::stop`] is called
    pub async fn start(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        self.stop_tx.send_replace(false);

        let first = if self.run_on_startup {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = tokio::time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Scheduled trigger started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.fire().await,
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduled trigger stopped");
    }

    /// Stop the trigger loop
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Check if trigger is running
    pub fn is_running(&self) -> bool {
        self.stop_tx.receiver_count() > 0 && !*self.stop_tx.borrow()
    }

    /// Run once, as a tick would
    pub async fn fire(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let outcome = match self.orchestrator.run().await {
            Ok(outcome) => {
                tracing::info!(tick, state = %outcome.state(), "Scheduled run finished");
                outcome.state().to_string()
            }
            Err(e) => {
                tracing::warn!(tick, error = %e, state = %e.terminal_state(), "Scheduled run failed");
                e.terminal_state().to_string()
            }
        };

        *self.last_outcome.write().await = Some(outcome);
    }

    /// Get trigger status
    pub async fn status(&self) -> TriggerStatus {
        TriggerStatus {
            is_running: self.is_running(),
            interval_secs: self.interval.as_secs(),
            ticks: self.ticks.load(Ordering::Relaxed),
            last_outcome: self.last_outcome.read().await.clone(),
        }
    }
}
