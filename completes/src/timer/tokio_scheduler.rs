//! A scheduler that runs timers as tasks on a tokio runtime.

use super::{timer, Scheduler, TimerCallback, TimerHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

/// Spawns one sleeping task per timer on a tokio runtime.
///
/// Callbacks run on a runtime worker thread; cancelling a timer also aborts
/// its task.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler on the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler on the runtime of the calling context, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let (handle, trigger) = timer(callback);

        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.fire();
        });

        trace!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Timer task spawned"
        );
        handle.with_abort(task.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tokio_timer_fires() {
        let scheduler = TokioScheduler::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = tx.send(42);
            }),
        );

        let value = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, 42);
        assert!(handle.is_fired());
    }

    #[tokio::test]
    async fn test_tokio_timer_cancel() {
        let scheduler = TokioScheduler::current().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();

        let handle = scheduler.schedule(
            Duration::from_millis(20),
            Box::new(move || {
                fired_clone.store(true, Ordering::SeqCst);
            }),
        );

        assert!(handle.cancel());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(TokioScheduler::current().is_none());
    }
}
