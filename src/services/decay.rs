//! Background decay sweeps.
//!
//! [`DecayScheduler::spawn`] starts a tokio task that sweeps immediately and
//! then once per interval. Each sweep runs one bounded batch at a time on the
//! blocking pool, checks for cancellation and yields between batches, and
//! publishes its [`DecayReport`] on a watch channel.

use crate::services::relationships::{DecayReport, RelationshipEngine};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns periodic decay sweeps.
pub struct DecayScheduler;

/// Handle to a running decay task.
///
/// Dropping the handle cancels the task.
pub struct DecayHandle {
    cancel: watch::Sender<bool>,
    reports: watch::Receiver<Option<DecayReport>>,
    task: Option<JoinHandle<()>>,
}

impl DecayScheduler {
    /// Starts sweeping every `interval`, beginning immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(engine: Arc<RelationshipEngine>, interval: Duration) -> DecayHandle {
        let (cancel, mut cancelled) = watch::channel(false);
        let (report_tx, reports) = watch::channel(None);

        info!(interval_secs = interval.as_secs(), "Starting decay scheduler");
        let task = tokio::spawn(async move {
            loop {
                match sweep(&engine, &cancelled).await {
                    Ok(report) => {
                        debug!(
                            batches = report.batches,
                            weakened = report.weakened,
                            completed = report.completed,
                            "Decay sweep finished"
                        );
                        metrics::counter!("decay_sweeps_total", "completed" => report.completed.to_string())
                            .increment(1);
                        report_tx.send_replace(Some(report));
                    },
                    Err(e) => {
                        warn!(error = %e, "Decay sweep failed");
                        metrics::counter!("decay_sweep_failures_total").increment(1);
                    },
                }

                if *cancelled.borrow() {
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(interval) => {},
                    _ = cancelled.changed() => {},
                }
                if *cancelled.borrow() {
                    break;
                }
            }
            info!("Decay scheduler stopped");
        });

        DecayHandle {
            cancel,
            reports,
            task: Some(task),
        }
    }

    /// Runs one sweep on the blocking pool, outside any schedule.
    ///
    /// # Errors
    ///
    /// Returns the first batch error.
    pub async fn run_once(engine: Arc<RelationshipEngine>) -> Result<DecayReport> {
        let (_cancel, cancelled) = watch::channel(false);
        sweep(&engine, &cancelled).await
    }
}

async fn sweep(
    engine: &Arc<RelationshipEngine>,
    cancelled: &watch::Receiver<bool>,
) -> Result<DecayReport> {
    let now = Utc::now();
    let mut report = DecayReport::default();
    let mut cursor: Option<String> = None;

    loop {
        if *cancelled.borrow() {
            return Ok(report);
        }
        let batch_engine = Arc::clone(engine);
        let batch_cursor = cursor.clone();
        let batch = tokio::task::spawn_blocking(move || {
            batch_engine.decay_batch(batch_cursor.as_deref(), now)
        })
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "decay_batch".to_string(),
            cause: e.to_string(),
        })??;

        report.absorb(&batch);
        match batch.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                report.completed = true;
                return Ok(report);
            },
        }
        tokio::task::yield_now().await;
    }
}

impl DecayHandle {
    /// Requests cancellation; the task stops after its current batch.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Subscribes to sweep reports.
    #[must_use]
    pub fn reports(&self) -> watch::Receiver<Option<DecayReport>> {
        self.reports.clone()
    }

    /// The most recent sweep report, if any sweep has finished.
    #[must_use]
    pub fn latest(&self) -> Option<DecayReport> {
        self.reports.borrow().clone()
    }

    /// Returns true once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancels the task and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel();
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.await.map_err(|e| Error::OperationFailed {
            operation: "decay_shutdown".to_string(),
            cause: e.to_string(),
        })
    }
}

impl Drop for DecayHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}
