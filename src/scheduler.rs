//! Periodic refresh loop.
//!
//! On start the loop runs one due-checked cycle (a fresh cache is left
//! alone), then forces a cycle every refresh interval until shut down. The
//! timer is not persisted; after a restart the startup due-check stands in
//! for it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::aggregator::Aggregator;
use crate::storage::KeyValueStore;

enum SchedulerMessage {
    Shutdown,
}

/// Handle for stopping a running refresh loop.
pub struct RefreshHandle {
    sender: mpsc::Sender<SchedulerMessage>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the loop and waits for it to exit. A cycle already in flight
    /// finishes first.
    pub async fn shutdown(self) {
        let _ = self.sender.send(SchedulerMessage::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Refresh loop ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns the refresh loop on the current tokio runtime.
///
/// `interval` must be non-zero.
pub fn spawn_refresh_loop<S: KeyValueStore>(
    aggregator: Arc<Aggregator<S>>,
    interval: Duration,
) -> RefreshHandle {
    let (sender, mut receiver) = mpsc::channel(4);

    let task = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick completes immediately: startup cycle, due-checked.
        timer.tick().await;
        aggregator.refresh(false).await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    aggregator.refresh(true).await;
                }
                msg = receiver.recv() => {
                    match msg {
                        Some(SchedulerMessage::Shutdown) | None => {
                            tracing::info!("Refresh loop stopped");
                            break;
                        }
                    }
                }
            }
        }
    });

    RefreshHandle { sender, task }
}
