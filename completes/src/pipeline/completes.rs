//! The completion pipeline and its public API.

use super::activation::Activation;
use super::CompletesBuilder;
use crate::core::{OutcomeCell, OutcomeState, StageKind, Waited};
use crate::errors::CompletesError;
use crate::stages::{Signal, Stage};
use crate::timer::Scheduler;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, debug_span, trace};
use uuid::Uuid;

/// Failure handler registered with `otherwise`.
pub type OtherwiseFn<T> = Box<dyn Fn(T) -> T + Send + Sync>;

pub(crate) struct Inner<T> {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) cell: OutcomeCell<T>,
    pub(crate) chain: Box<[Stage<T>]>,
    pub(crate) otherwise: Option<OtherwiseFn<T>>,
    pub(crate) repeatable: bool,
    pub(crate) scheduler: Option<Arc<dyn Scheduler>>,
    /// Head-stage deadline armed at build time, consumed by the first supply.
    pub(crate) armed_head: Mutex<Option<Arc<Activation>>>,
}

/// A single-assignment value completed asynchronously through a chain of stages.
///
/// `Completes` is a cheap handle; clones share the same pipeline, so one
/// thread can [`supply`](Self::supply) while another [`wait`](Self::wait)s.
///
/// ```
/// use completes::Completes;
///
/// let completes = Completes::with_initial(0)
///     .and_then(|v| v * 2)
///     .build()
///     .unwrap();
///
/// completes.supply(5);
/// assert_eq!(completes.current_value(), Some(10));
/// ```
pub struct Completes<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Completes<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Completes<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Starts building a pipeline whose current value is seeded with `value`.
    #[must_use]
    pub fn with_initial(value: T) -> CompletesBuilder<T> {
        CompletesBuilder::new(value)
    }

    /// Starts building a pipeline seeded with `T::default()`.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> CompletesBuilder<T>
    where
        T: Default,
    {
        CompletesBuilder::new(T::default())
    }

    /// Creates a pipeline that is already succeeded with `value`.
    #[must_use]
    pub fn completed(value: T) -> Self {
        Self::from_inner(Inner {
            id: Uuid::new_v4(),
            name: "completes".to_string(),
            cell: OutcomeCell::completed(value),
            chain: Box::new([]),
            otherwise: None,
            repeatable: false,
            scheduler: None,
            armed_head: Mutex::new(None),
        })
    }

    pub(crate) fn from_inner(inner: Inner<T>) -> Self {
        let inner = Arc::new(inner);

        // The head stage is active from the moment the pipeline waits for its outcome
        if !inner.cell.state().is_terminal() {
            if let (Some(head), Some(initial)) = (inner.chain.first(), inner.cell.read()) {
                if let Some(deadline) = head.deadline() {
                    let activation = inner.arm(0, deadline, initial);
                    *inner.armed_head.lock() = activation;
                }
            }
        }

        debug!(
            pipeline = %inner.id,
            name = %inner.name,
            stages = inner.chain.len(),
            repeatable = inner.repeatable,
            "Pipeline built"
        );
        Self { inner }
    }

    /// Drives `value` into the head stage.
    ///
    /// The chain runs synchronously on the calling thread until it finishes
    /// or a deadline takes over. A one-shot pipeline that has already
    /// settled ignores further supplies.
    pub fn supply(&self, value: T) {
        let inner = &self.inner;
        let span = debug_span!("supply", pipeline = %inner.id, name = %inner.name);
        let _enter = span.enter();

        if inner.cell.state().is_terminal() {
            debug!(state = %inner.cell.state(), "Supply ignored; pipeline already settled");
            return;
        }

        let head = inner.armed_head.lock().take();
        let head_armed = match head {
            Some(activation) => {
                if activation.claim() {
                    activation.disarm();
                    true
                } else if inner.repeatable {
                    // The idle deadline already closed the previous cycle
                    false
                } else {
                    debug!("Supply ignored; head stage deadline already expired");
                    return;
                }
            }
            None => false,
        };

        trace!("Supplying outcome");
        inner.walk(0, Signal::Outcome(value), head_armed);
    }

    /// Returns the current value regardless of state.
    #[must_use]
    pub fn current_value(&self) -> Option<T> {
        self.inner.cell.read()
    }

    /// Blocks until the pipeline settles and returns its outcome.
    ///
    /// Returns `None` when the pipeline failed with a raised error. On a
    /// repeatable pipeline this waits for the next completion.
    pub fn wait(&self) -> Option<T> {
        self.inner.cell.wait()
    }

    /// Blocks until the pipeline settles or `timeout` elapses.
    ///
    /// Timing out leaves the pipeline untouched; a later supply can still
    /// complete it.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        self.inner.cell.wait_timeout(timeout).into_value()
    }

    /// Like [`wait_timeout`](Self::wait_timeout), but also reports whether
    /// the completion succeeded or failed.
    ///
    /// On a repeatable pipeline the cell has usually rewound by the time the
    /// waiter wakes, so this is the way to tell a failed cycle's value from a
    /// successful one.
    pub fn wait_settled(&self, timeout: Duration) -> Waited<T> {
        self.inner.cell.wait_timeout(timeout)
    }
}

impl<T> Completes<T> {
    /// Returns true if the latest completion settled as Failed.
    ///
    /// A repeatable pipeline keeps reporting its latest cycle after rewinding.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.inner.cell.last_state().is_failure()
    }

    /// Returns the state reached by the latest completion, or Pending if the
    /// pipeline has never settled.
    #[must_use]
    pub fn last_state(&self) -> OutcomeState {
        self.inner.cell.last_state()
    }

    /// Returns the outcome state.
    #[must_use]
    pub fn state(&self) -> OutcomeState {
        self.inner.cell.state()
    }

    /// Returns true if the pipeline rewinds after each completion.
    #[must_use]
    pub fn is_repeatable(&self) -> bool {
        self.inner.repeatable
    }

    /// Returns the pipeline id used in log spans.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the number of stages in the chain.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.inner.chain.len()
    }
}

impl<T: Clone> Completes<T> {
    /// Returns the raised error of a pipeline that failed without recovery.
    #[must_use]
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.inner.cell.error()
    }

    /// Returns how many times the pipeline has settled.
    #[must_use]
    pub fn completion_count(&self) -> u64 {
        self.inner.cell.completions()
    }
}

impl<T: PartialEq> Completes<T> {
    /// Returns the kind of each stage, in chain order.
    #[must_use]
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.inner.chain.iter().map(Stage::kind).collect()
    }
}

impl<T> std::fmt::Debug for Completes<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completes")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.inner.cell.state())
            .field("stages", &self.inner.chain.len())
            .field("repeatable", &self.inner.repeatable)
            .finish()
    }
}

impl<T> Inner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Runs the chain from `start`, threading `signal` through each stage.
    fn walk(self: &Arc<Self>, start: usize, mut signal: Signal<T>, head_armed: bool) {
        for (index, stage) in self.chain.iter().enumerate().skip(start) {
            signal = match signal {
                Signal::Outcome(value) => {
                    let already_armed = index == 0 && head_armed;
                    match stage.deadline().filter(|_| !already_armed) {
                        Some(deadline) => {
                            let activation = self.arm(index, deadline, value.clone());
                            if activation.as_ref().is_some_and(|a| a.is_claimed()) {
                                debug!(stage = index, "Stage skipped; deadline expired before it ran");
                                return;
                            }
                            let next = stage.on_outcome(index, value);
                            if let Some(activation) = activation {
                                if !activation.claim() {
                                    debug!(stage = index, "Stage result discarded; deadline expired first");
                                    return;
                                }
                                activation.disarm();
                            }
                            next
                        }
                        None => stage.on_outcome(index, value),
                    }
                }
                Signal::Failure(value) => stage.on_failure(value),
                Signal::Error(error) => stage.on_error(index, error),
            };
            trace!(stage = index, kind = %stage.kind(), signal = signal.label(), "Stage dispatched");
        }

        self.settle(signal);
    }

    /// Arms the deadline for stage `index`; on expiry the stage fails with `value`.
    fn arm(self: &Arc<Self>, index: usize, deadline: Duration, value: T) -> Option<Arc<Activation>> {
        let scheduler = self.scheduler.as_ref()?;
        let activation = Arc::new(Activation::new(index));

        let weak: Weak<Self> = Arc::downgrade(self);
        let expiring = Arc::clone(&activation);
        let handle = scheduler.schedule(
            deadline,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if expiring.claim() {
                        inner.expire(&expiring, value);
                    }
                }
            }),
        );
        activation.attach(handle);

        trace!(
            stage = index,
            deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            "Stage deadline armed"
        );
        Some(activation)
    }

    fn expire(self: &Arc<Self>, activation: &Activation, value: T) {
        let span = debug_span!("deadline", pipeline = %self.id, name = %self.name);
        let _enter = span.enter();

        debug!(stage = activation.stage(), "Stage deadline expired");
        self.walk(activation.stage(), Signal::Failure(value), false);
    }

    /// Writes the terminal signal into the cell; a repeatable pipeline rewinds.
    fn settle(&self, signal: Signal<T>) {
        if self.cell.state().is_terminal() {
            trace!("Settle skipped; cell already terminal");
            return;
        }

        let written = match signal {
            Signal::Outcome(value) => self.cell.try_succeed(value),
            Signal::Failure(value) => match &self.otherwise {
                Some(handler) => match catch_unwind(AssertUnwindSafe(|| handler(value))) {
                    Ok(handled) => self.cell.try_fail(handled),
                    Err(payload) => self.cell.try_fail_with_error(
                        CompletesError::from_panic(self.chain.len(), payload.as_ref()).into(),
                    ),
                },
                None => self.cell.try_fail(value),
            },
            Signal::Error(error) => {
                debug!(error = %error, "Raised error reached the tail without recovery");
                self.cell.try_fail_with_error(error)
            }
        };

        if written {
            debug!(state = %self.cell.state(), "Pipeline settled");
            if self.repeatable && self.cell.reset() {
                trace!("Pipeline rewound for the next supply");
            }
        }
    }
}
