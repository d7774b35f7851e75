//! Periodic timers with first-class cancellation.
//!
//! [`PeriodicTimer::spawn`] runs an action on a Tokio task every `period`,
//! the first time immediately; [`PeriodicTimer::spawn_after`] waits one
//! period first.  The action receives the timer's own
//! [`TimerHandle`] so it can cancel its recurrence from inside (the static
//! fetch does this on success); the owner holds a clone and can cancel from
//! outside (node shutdown).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancellation handle for one periodic timer.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    name: Arc<str>,
    token: CancellationToken,
    fired: Arc<AtomicU64>,
}

impl TimerHandle {
    /// Stop future recurrences.  An action already running completes.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!(timer = %self.name, "timer cancelled");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// How many times the action has run.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A running periodic timer.
pub struct PeriodicTimer {
    handle: TimerHandle,
    task: JoinHandle<()>,
}

impl PeriodicTimer {
    /// Spawn `action` on the current Tokio runtime.  The first run is
    /// immediate.
    ///
    /// Ticks missed while the action runs are skipped rather than bunched up.
    pub fn spawn<F>(name: &str, period: Duration, action: F) -> Self
    where
        F: FnMut(&TimerHandle) + Send + 'static,
    {
        Self::spawn_at(name, Instant::now(), period, action)
    }

    /// Like [`spawn`][Self::spawn], but the first run happens one `period`
    /// from now.
    pub fn spawn_after<F>(name: &str, period: Duration, action: F) -> Self
    where
        F: FnMut(&TimerHandle) + Send + 'static,
    {
        Self::spawn_at(name, Instant::now() + period, period, action)
    }

    fn spawn_at<F>(name: &str, start: Instant, period: Duration, mut action: F) -> Self
    where
        F: FnMut(&TimerHandle) + Send + 'static,
    {
        let handle = TimerHandle {
            name: Arc::from(name),
            token: CancellationToken::new(),
            fired: Arc::new(AtomicU64::new(0)),
        };
        let task_handle = handle.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = task_handle.token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                action(&task_handle);
                task_handle.fired.fetch_add(1, Ordering::SeqCst);
                if task_handle.is_cancelled() {
                    break;
                }
            }
            debug!(timer = %task_handle.name, fired = task_handle.fired(), "timer stopped");
        });
        Self { handle, task }
    }

    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Cancel and wait for the task to wind down.
    pub async fn shutdown(self) {
        self.handle.cancel();
        self.join().await;
    }

    /// Wait for the timer to stop on its own.  Returns `false` when the task
    /// panicked or was aborted; the failure is logged.
    pub async fn join(self) -> bool {
        match self.task.await {
            Ok(()) => true,
            Err(e) => {
                warn!(timer = %self.handle.name, error = %e, "timer task failed");
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
