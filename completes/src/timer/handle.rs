//! Cancellable one-shot timer handles.
//!
//! A timer is split into two halves sharing one atomic state word: the
//! [`TimerHandle`] held by whoever armed it, and the [`TimerTrigger`] held by
//! the scheduler. Firing and cancelling both claim the state with a
//! compare-and-swap, so exactly one of them takes effect.

use super::TimerCallback;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

const SCHEDULED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Default)]
struct TimerShared {
    state: AtomicU8,
}

impl TimerShared {
    fn claim(&self, target: u8) -> bool {
        self.state
            .compare_exchange(SCHEDULED, target, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Creates a linked handle/trigger pair for `callback`.
///
/// Scheduler implementations keep the trigger and call [`TimerTrigger::fire`]
/// once the delay has elapsed; the handle goes back to the caller.
pub fn timer(callback: TimerCallback) -> (TimerHandle, TimerTrigger) {
    let shared = Arc::new(TimerShared::default());
    (
        TimerHandle {
            shared: Arc::clone(&shared),
            abort: None,
        },
        TimerTrigger { shared, callback },
    )
}

/// The caller's side of a scheduled timer.
pub struct TimerHandle {
    shared: Arc<TimerShared>,
    abort: Option<tokio::task::AbortHandle>,
}

impl TimerHandle {
    /// Attaches the task backing this timer so cancellation also aborts it.
    #[must_use]
    pub fn with_abort(mut self, abort: tokio::task::AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Cancels the timer.
    ///
    /// Returns true if cancellation prevented the callback from firing.
    pub fn cancel(&self) -> bool {
        if self.shared.claim(CANCELLED) {
            if let Some(abort) = &self.abort {
                abort.abort();
            }
            true
        } else {
            false
        }
    }

    /// Returns true if the callback has fired (or is firing).
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == FIRED
    }

    /// Returns true if the timer was cancelled before firing.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Returns true if the timer has neither fired nor been cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == SCHEDULED
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("fired", &self.is_fired())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The scheduler's side of a timer.
pub struct TimerTrigger {
    shared: Arc<TimerShared>,
    callback: TimerCallback,
}

impl TimerTrigger {
    /// Runs the callback unless the timer was cancelled first.
    ///
    /// Returns true if the callback ran. A panicking callback is logged and
    /// suppressed.
    pub fn fire(self) -> bool {
        if !self.shared.claim(FIRED) {
            return false;
        }

        let callback = self.callback;
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
            warn!("Timer callback panicked: {:?}", e);
        }
        true
    }

    /// Returns true if the owning handle cancelled this timer.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == CANCELLED
    }
}

impl std::fmt::Debug for TimerTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerTrigger")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, TimerCallback) {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let callback: TimerCallback = Box::new(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        (counter, callback)
    }

    #[test]
    fn test_fire_runs_callback() {
        let (counter, callback) = counting();
        let (handle, trigger) = timer(callback);

        assert!(handle.is_pending());
        assert!(trigger.fire());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handle.is_fired());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let (counter, callback) = counting();
        let (handle, trigger) = timer(callback);

        assert!(handle.cancel());
        assert!(trigger.is_cancelled());
        assert!(!trigger.fire());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_idempotent() {
        let (_counter, callback) = counting();
        let (handle, _trigger) = timer(callback);

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_panicking_callback_suppressed() {
        let (handle, trigger) = timer(Box::new(|| panic!("Intentional panic")));

        assert!(trigger.fire());
        assert!(handle.is_fired());
    }
}
