//! Fixed-interval driver for background ticks.
//!
//! One task runs every registered `PeriodicTask` in order, once per
//! interval. A failed tick is logged and retried at the next interval,
//! forever. Shutdown is a `watch` flag checked between ticks, so an
//! in-flight tick always finishes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use herald_core::error::DomainError;

/// Work performed on every scheduler tick.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Performs one tick. Returns how many items were processed.
    ///
    /// # Errors
    ///
    /// Any error is logged by the scheduler and the tick is retried on the
    /// next interval.
    async fn run_once(&self) -> Result<usize, DomainError>;
}

/// Runs periodic tasks sequentially on a fixed interval.
pub struct Scheduler {
    interval: Duration,
    tasks: Vec<Arc<dyn PeriodicTask>>,
}

impl Scheduler {
    /// Creates a scheduler ticking every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tasks: Vec::new(),
        }
    }

    /// Adds a task; tasks run in the order added.
    #[must_use]
    pub fn with_task(mut self, task: Arc<dyn PeriodicTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Runs one round of every task, logging failures.
    pub async fn tick(&self) {
        for task in &self.tasks {
            match task.run_once().await {
                Ok(0) => {}
                Ok(processed) => debug!(task = task.name(), processed, "tick complete"),
                Err(err) => error!(
                    task = task.name(),
                    error = %err,
                    "tick failed; retrying next interval"
                ),
            }
        }
    }

    /// Ticks until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            tasks = self.tasks.len(),
            "scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Spawns `run` on the runtime.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
