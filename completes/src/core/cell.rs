//! The outcome cell: the single place where a value and a failure race.
//!
//! The Pending to terminal transition is claimed with a compare-and-swap on
//! an atomic state word, so only the first writer of a completion cycle wins
//! and every later writer is a silent no-op. The value itself lives behind a
//! short-lived mutex that also backs the condition variable used by blocking
//! waiters.

use super::OutcomeState;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PENDING: u8 = 0;
const COMPLETING: u8 = 1;
const SUCCEEDED: u8 = 2;
const FAILED: u8 = 3;

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    error: Option<Arc<anyhow::Error>>,
    /// Number of terminal transitions so far.
    generation: u64,
    /// Value written by the latest terminal transition, kept across resets.
    last: Option<T>,
    /// State reached by the latest terminal transition, kept across resets.
    last_state: OutcomeState,
}

/// Result of a bounded wait on the cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Waited<T> {
    /// The cell settled.
    Settled {
        /// The settled value; absent for raised errors.
        value: Option<T>,
        /// Whether that completion succeeded or failed.
        state: OutcomeState,
    },
    /// The deadline passed first.
    TimedOut,
}

impl<T> Waited<T> {
    /// Returns the settled value, or `None` if the wait timed out.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Settled { value, .. } => value,
            Self::TimedOut => None,
        }
    }

    /// Returns the settled state, or Pending if the wait timed out.
    #[must_use]
    pub fn state(&self) -> OutcomeState {
        match self {
            Self::Settled { state, .. } => *state,
            Self::TimedOut => OutcomeState::Pending,
        }
    }

    /// Returns true if the wait timed out.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// A single-assignment outcome holder with exactly-once terminal transition.
pub struct OutcomeCell<T> {
    state: AtomicU8,
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

impl<T: Clone> OutcomeCell<T> {
    /// Creates an empty, pending cell.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(PENDING, None)
    }

    /// Creates a pending cell whose current value is pre-seeded.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::from_parts(PENDING, Some(value))
    }

    /// Creates a cell that is already succeeded with the given value.
    #[must_use]
    pub fn completed(value: T) -> Self {
        let cell = Self::from_parts(SUCCEEDED, Some(value.clone()));
        {
            let mut slot = cell.slot.lock();
            slot.generation = 1;
            slot.last = Some(value);
            slot.last_state = OutcomeState::Succeeded;
        }
        cell
    }

    fn from_parts(state: u8, value: Option<T>) -> Self {
        Self {
            state: AtomicU8::new(state),
            slot: Mutex::new(Slot {
                value,
                error: None,
                generation: 0,
                last: None,
                last_state: OutcomeState::Pending,
            }),
            settled: Condvar::new(),
        }
    }

    /// Attempts the Pending to Succeeded transition.
    ///
    /// Returns false if another writer already won this cycle.
    pub fn try_succeed(&self, value: T) -> bool {
        self.settle(SUCCEEDED, Some(value), None)
    }

    /// Attempts the Pending to Failed transition, keeping `value` as the outcome.
    pub fn try_fail(&self, value: T) -> bool {
        self.settle(FAILED, Some(value), None)
    }

    /// Attempts the Pending to Failed transition for a raised error.
    ///
    /// The value becomes absent and the error is retained for inspection.
    pub fn try_fail_with_error(&self, error: anyhow::Error) -> bool {
        self.settle(FAILED, None, Some(Arc::new(error)))
    }

    fn settle(&self, target: u8, value: Option<T>, error: Option<Arc<anyhow::Error>>) -> bool {
        if self
            .state
            .compare_exchange(PENDING, COMPLETING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut slot = self.slot.lock();
        slot.last.clone_from(&value);
        slot.value = value;
        slot.error = error;
        slot.generation += 1;
        slot.last_state = if target == FAILED {
            OutcomeState::Failed
        } else {
            OutcomeState::Succeeded
        };
        self.state.store(target, Ordering::SeqCst);
        self.settled.notify_all();
        true
    }

    /// Returns the current value regardless of state.
    ///
    /// While pending this is the seeded value, if any.
    #[must_use]
    pub fn read(&self) -> Option<T> {
        self.slot.lock().value.clone()
    }

    /// Returns the raised error held by a failed cell, if any.
    #[must_use]
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.slot.lock().error.clone()
    }

    /// Returns the number of terminal transitions the cell has gone through.
    #[must_use]
    pub fn completions(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Returns to Pending with an absent value.
    ///
    /// Only a terminal cell can be reset; returns false otherwise.
    pub fn reset(&self) -> bool {
        let mut slot = self.slot.lock();
        let current = self.state.load(Ordering::SeqCst);
        if current != SUCCEEDED && current != FAILED {
            return false;
        }
        slot.value = None;
        slot.error = None;
        self.state.store(PENDING, Ordering::SeqCst);
        true
    }

    /// Blocks until the cell settles and returns the settled value.
    pub fn wait(&self) -> Option<T> {
        self.wait_until(None).into_value()
    }

    /// Blocks until the cell settles or `timeout` elapses.
    ///
    /// A timeout too large to represent as an instant waits without limit.
    pub fn wait_timeout(&self, timeout: Duration) -> Waited<T> {
        self.wait_until(Instant::now().checked_add(timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Waited<T> {
        let mut slot = self.slot.lock();
        let start = slot.generation;

        loop {
            if let Some(waited) = self.settled_since(&slot, start) {
                return waited;
            }

            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut slot, deadline).timed_out() {
                        return self
                            .settled_since(&slot, start)
                            .unwrap_or(Waited::TimedOut);
                    }
                }
                None => self.settled.wait(&mut slot),
            }
        }
    }

    fn settled_since(&self, slot: &Slot<T>, start: u64) -> Option<Waited<T>> {
        let state = self.state();
        if state.is_terminal() {
            return Some(Waited::Settled {
                value: slot.value.clone(),
                state,
            });
        }
        // A repeatable pipeline may already have reset the cell
        (slot.generation != start).then(|| Waited::Settled {
            value: slot.last.clone(),
            state: slot.last_state,
        })
    }
}

impl<T> OutcomeCell<T> {
    /// Returns the current state; a write in progress still reads as Pending.
    #[must_use]
    pub fn state(&self) -> OutcomeState {
        match self.state.load(Ordering::SeqCst) {
            SUCCEEDED => OutcomeState::Succeeded,
            FAILED => OutcomeState::Failed,
            _ => OutcomeState::Pending,
        }
    }

    /// Returns true if the terminal state is Failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FAILED
    }

    /// Returns the state reached by the latest terminal transition.
    ///
    /// Survives [`reset`](OutcomeCell::reset); Pending if the cell never settled.
    #[must_use]
    pub fn last_state(&self) -> OutcomeState {
        self.slot.lock().last_state
    }
}

impl<T: Clone> Default for OutcomeCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for OutcomeCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeCell")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
