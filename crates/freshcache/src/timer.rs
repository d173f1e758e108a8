//! Scheduling primitives used by the cache.
//!
//! The refresh schedule is a [`RecurringTask`], a cancelable tokio task driven by an interval.
//! Load attempts are bounded with [`bounded`].

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// A periodic task that runs until canceled or dropped.
#[derive(Debug)]
pub struct RecurringTask {
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawns a task that calls `tick` every `period`, starting one period from now.
    ///
    /// The task ends as soon as `tick` returns `false`. Ticks that are missed because the runtime
    /// was busy are skipped rather than bursted.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime, or if `period` is zero.
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        assert!(!period.is_zero(), "recurring task period must be non-zero");

        let handle = tokio::spawn(async move {
            // A period too large to schedule simply never fires.
            let Some(start) = Instant::now().checked_add(period) else {
                return;
            };
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if !tick() {
                    tracing::trace!("recurring task finished");
                    break;
                }
            }
        });

        Self { handle }
    }

    /// Stops the task. A tick that is currently running is not interrupted.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns `true` once the task was canceled or has finished on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Requires `f` to complete within `limit`, if a limit is given.
///
/// On expiry `f` is dropped and the limit is returned as the error.
pub async fn bounded<F: Future>(limit: Option<Duration>, f: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => time::timeout(limit, f).await.map_err(|_| limit),
        None => Ok(f.await),
    }
}
