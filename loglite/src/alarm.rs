use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A periodic alarm backed by a dedicated task.
///
/// The callback runs one period after registration and then at every
/// period boundary, never inline with [`Alarm::register`], and never
/// concurrently with itself. [`Alarm::cancel`] resolves only after any
/// in-progress callback invocation has finished, and guarantees the
/// callback will not run again.
pub struct Alarm {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Alarm {
    pub fn register<F, Fut>(period: Duration, mut callback: F) -> Alarm
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let fired = cancel.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = fired.cancelled() => return,
                    _ = interval.tick() => {}
                }
                // Deliberately not raced against cancellation: cancel()
                // must wait out a running callback.
                callback().await;
            }
        });
        Alarm {
            cancel,
            task: Some(task),
        }
    }

    /// Stops the alarm. When this resolves the callback is not running
    /// and will not run again.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
