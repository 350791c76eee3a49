//! The race between a stage's deadline and its delivery.

use crate::timer::TimerHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// One armed deadline for one stage, for one traversal.
///
/// Delivery and the deadline callback both call [`Activation::claim`]; the
/// first caller owns the stage's result and the other backs off.
#[derive(Debug)]
pub(crate) struct Activation {
    stage: usize,
    claimed: AtomicBool,
    timer: Mutex<Option<TimerHandle>>,
}

impl Activation {
    pub(crate) fn new(stage: usize) -> Self {
        Self {
            stage,
            claimed: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    pub(crate) fn stage(&self) -> usize {
        self.stage
    }

    /// Returns true for the first caller only.
    pub(crate) fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns true once either side has claimed the stage.
    pub(crate) fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    pub(crate) fn attach(&self, handle: TimerHandle) {
        *self.timer.lock() = Some(handle);
    }

    /// Cancels the deadline timer; returns true if that stopped it firing.
    pub(crate) fn disarm(&self) -> bool {
        self.timer
            .lock()
            .take()
            .is_some_and(|handle| handle.cancel())
    }
}
