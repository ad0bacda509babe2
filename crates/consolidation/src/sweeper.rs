//! Periodic sweep task

use crate::engine::ConsolidationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Cadence used when none is configured
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Background task calling [`ConsolidationEngine::sweep`] on a fixed interval
pub struct Sweeper;

impl Sweeper {
    /// Spawn the sweep loop on the current runtime.
    ///
    /// The first sweep runs immediately so schedule groups learn the slot
    /// in effect at startup.
    pub fn spawn(engine: Arc<ConsolidationEngine>, every: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Sweeper started, interval {:?}", every);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        debug!("sweeping");
                        engine.sweep();
                    }
                }
            }

            info!("Sweeper stopped");
        });

        SweeperHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Owned cancellation handle; dropping it stops the sweeper as well
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the loop and wait for the task to finish
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
