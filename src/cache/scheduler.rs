use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::SyncError;

/// Fixed-interval background trigger.
///
/// Knows nothing about syncing: each tick calls the supplied closure and
/// awaits the future it returns. A closure returning `None` ends the loop.
#[derive(Debug)]
pub struct AutoSyncScheduler {
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSyncScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    /// Start ticking. The first tick fires one interval from now.
    ///
    /// Returns `Ok(false)` when already running.
    pub fn start<F, Fut>(&self, mut tick: F) -> Result<bool, SyncError>
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Internal(format!("auto-sync needs a tokio runtime: {e}")))?;

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Auto-sync already running");
            return Ok(false);
        }

        let period = self.interval;
        *task = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match tick() {
                    Some(run) => {
                        run.await;
                    }
                    None => {
                        debug!("Auto-sync target is gone, stopping");
                        break;
                    }
                }
            }
        }));

        info!("⏱️  Auto-sync every {}s", period.as_secs());
        Ok(true)
    }

    /// Stop ticking. Returns whether a running task was stopped.
    pub fn stop(&self) -> bool {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("Auto-sync stopped");
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}
