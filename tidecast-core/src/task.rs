//! Cancellable periodic task abstraction.
//!
//! Session teardown must be able to assert that both the viewing-time tick
//! and the payment settlement tick are cancelled, which is awkward against
//! raw timer APIs. Wrapping the spawned task in a handle with a synchronous,
//! idempotent `cancel` makes the teardown path checkable.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

/// Handle to a fixed-interval background task.
///
/// Cancelling (or dropping) the handle aborts the task; ticks scheduled
/// after cancellation never run.
#[derive(Debug)]
pub struct PeriodicTask {
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns a task invoking `tick` every `interval`.
    ///
    /// The first invocation happens one full interval after spawning, not
    /// immediately. Missed ticks are skipped rather than bursted.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick so invocations are
            // interval-spaced from spawn time.
            timer.tick().await;
            loop {
                timer.tick().await;
                trace!(?interval, "periodic task tick");
                tick();
            }
        });

        Self { handle }
    }

    /// Cancels the task synchronously. Idempotent.
    pub fn cancel(&mut self) {
        self.handle.abort();
    }

    /// Whether the underlying task has finished (only after cancellation).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
