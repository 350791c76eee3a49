//! The timer contract and its implementations.
//!
//! Pipelines only need "run this callback once after a delay, unless
//! cancelled first". This module provides:
//! - [`Scheduler`], the contract
//! - [`TimerHandle`] / [`TimerTrigger`], the cancellable timer halves
//! - [`ThreadScheduler`], a dedicated timer thread over a min-heap
//! - [`TokioScheduler`], timers as sleeping tasks on a tokio runtime

mod handle;
mod thread;
mod tokio_scheduler;

pub use handle::{timer, TimerHandle, TimerTrigger};
pub use thread::ThreadScheduler;
pub use tokio_scheduler::TokioScheduler;

use std::time::Duration;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks.
///
/// Implementations must run `callback` at most once, on any thread, no
/// earlier than `delay` after the call, and never after the returned handle
/// was successfully cancelled.
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler: Send + Sync {
    /// Schedules `callback` to fire once after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}
