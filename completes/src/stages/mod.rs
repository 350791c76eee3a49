//! Stage records and dispatch.
//!
//! A pipeline's chain is an arena of [`Stage`] records addressed by position;
//! the successor of stage `i` is stage `i + 1`. Each stage turns an incoming
//! [`Signal`] into the signal handed to its successor. Raised errors travel as
//! an explicit `Signal::Error` rather than unwinding.

use crate::core::StageKind;
use crate::errors::{CompletesError, RecoveryError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::trace;

/// Fallible value transform.
pub type TransformFn<T> = Box<dyn Fn(T) -> anyhow::Result<T> + Send + Sync>;

/// Side-effecting observer of an outcome.
pub type ConsumeFn<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Maps a raised error to a recovery value.
pub type RecoverFn<T> = Box<dyn Fn(&anyhow::Error) -> anyhow::Result<T> + Send + Sync>;

/// What flows from one stage to the next.
#[derive(Debug)]
pub enum Signal<T> {
    /// A normal outcome.
    Outcome(T),
    /// A business failure carrying the failed outcome.
    Failure(T),
    /// A raised error.
    Error(anyhow::Error),
}

impl<T> Signal<T> {
    /// Returns a short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Outcome(_) => "outcome",
            Self::Failure(_) => "failure",
            Self::Error(_) => "error",
        }
    }
}

/// The function a stage wraps.
pub enum StageAction<T> {
    /// Maps the outcome.
    Transform(TransformFn<T>),
    /// Observes the outcome and forwards it unchanged.
    Consume(ConsumeFn<T>),
    /// Maps a raised error back into an outcome.
    Recover(RecoverFn<T>),
    /// Forwards everything unchanged.
    Passthrough,
}

impl<T> StageAction<T> {
    /// Returns the stage kind this action implies.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Transform(_) => StageKind::Transform,
            Self::Consume(_) => StageKind::Consumer,
            Self::Recover(_) => StageKind::Recover,
            Self::Passthrough => StageKind::Passthrough,
        }
    }
}

impl<T> std::fmt::Debug for StageAction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Per-stage options: a failure sentinel and a deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOptions<T> {
    /// An outcome equal to this value fails the stage instead of running it.
    pub fail_on: Option<T>,
    /// Time the stage may stay active before it fails.
    pub deadline: Option<Duration>,
}

impl<T> Default for StageOptions<T> {
    fn default() -> Self {
        Self {
            fail_on: None,
            deadline: None,
        }
    }
}

impl<T> StageOptions<T> {
    /// Creates options with neither sentinel nor deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure sentinel.
    #[must_use]
    pub fn fail_on(mut self, sentinel: T) -> Self {
        self.fail_on = Some(sentinel);
        self
    }

    /// Sets the deadline.
    #[must_use]
    pub fn within(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// One link in a pipeline.
#[derive(Debug)]
pub struct Stage<T> {
    action: StageAction<T>,
    options: StageOptions<T>,
}

impl<T: PartialEq> Stage<T> {
    /// Creates a stage.
    #[must_use]
    pub fn new(action: StageAction<T>, options: StageOptions<T>) -> Self {
        Self { action, options }
    }

    /// Returns the stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.action.kind()
    }

    /// Returns the stage deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.options.deadline
    }

    pub(crate) fn set_default_deadline(&mut self, deadline: Duration) {
        if self.options.deadline.is_none()
            && matches!(self.kind(), StageKind::Transform | StageKind::Consumer)
        {
            self.options.deadline = Some(deadline);
        }
    }

    /// Returns the failure sentinel, if any.
    #[must_use]
    pub fn fail_on(&self) -> Option<&T> {
        self.options.fail_on.as_ref()
    }

    /// Returns true if `value` equals this stage's sentinel.
    #[must_use]
    pub fn is_sentinel(&self, value: &T) -> bool {
        self.options.fail_on.as_ref() == Some(value)
    }

    /// Handles normal delivery.
    ///
    /// A sentinel match turns into a failure without running the function;
    /// a function error or panic turns into a raised error.
    pub fn on_outcome(&self, index: usize, value: T) -> Signal<T> {
        if self.is_sentinel(&value) {
            trace!(stage = index, "Outcome matched failure sentinel");
            return self.on_failure(value);
        }

        match &self.action {
            StageAction::Transform(func) => {
                match catch_unwind(AssertUnwindSafe(|| func(value))) {
                    Ok(Ok(next)) => Signal::Outcome(next),
                    Ok(Err(e)) => Signal::Error(e),
                    Err(payload) => {
                        Signal::Error(CompletesError::from_panic(index, payload.as_ref()).into())
                    }
                }
            }
            StageAction::Consume(func) => match catch_unwind(AssertUnwindSafe(|| func(&value))) {
                Ok(()) => Signal::Outcome(value),
                Err(payload) => {
                    Signal::Error(CompletesError::from_panic(index, payload.as_ref()).into())
                }
            },
            StageAction::Recover(_) | StageAction::Passthrough => Signal::Outcome(value),
        }
    }

    /// Handles a failure: forwarded without running the function.
    pub fn on_failure(&self, value: T) -> Signal<T> {
        Signal::Failure(value)
    }

    /// Handles a raised error.
    ///
    /// Only a recover stage acts on it; a failing mapper produces a
    /// [`RecoveryError`] that keeps the original error as its suppressed cause.
    pub fn on_error(&self, index: usize, error: anyhow::Error) -> Signal<T> {
        let StageAction::Recover(mapper) = &self.action else {
            return Signal::Error(error);
        };

        trace!(stage = index, error = %error, "Recovering from raised error");
        match catch_unwind(AssertUnwindSafe(|| mapper(&error))) {
            Ok(Ok(value)) => Signal::Outcome(value),
            Ok(Err(mapper_error)) => {
                Signal::Error(CompletesError::from(RecoveryError::new(mapper_error, error)).into())
            }
            Err(payload) => {
                let panicked = CompletesError::from_panic(index, payload.as_ref()).into();
                Signal::Error(CompletesError::from(RecoveryError::new(panicked, error)).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transform(f: impl Fn(i32) -> anyhow::Result<i32> + Send + Sync + 'static) -> Stage<i32> {
        Stage::new(StageAction::Transform(Box::new(f)), StageOptions::new())
    }

    fn recover(f: impl Fn(&anyhow::Error) -> anyhow::Result<i32> + Send + Sync + 'static) -> Stage<i32> {
        Stage::new(StageAction::Recover(Box::new(f)), StageOptions::new())
    }

    #[test]
    fn test_transform_outcome() {
        let stage = transform(|v| Ok(v * 2));
        assert!(matches!(stage.on_outcome(0, 5), Signal::Outcome(10)));
        assert_eq!(stage.kind(), StageKind::Transform);
    }

    #[test]
    fn test_sentinel_routes_to_failure() {
        let stage = Stage::new(
            StageAction::Transform(Box::new(|v: i32| -> anyhow::Result<i32> { Ok(v * 2) })),
            StageOptions::new().fail_on(0),
        );
        assert!(matches!(stage.on_outcome(0, 0), Signal::Failure(0)));
        assert!(matches!(stage.on_outcome(0, 1), Signal::Outcome(2)));
    }

    #[test]
    fn test_absent_sentinel_matches_absent_outcome() {
        let stage: Stage<Option<i32>> = Stage::new(
            StageAction::Transform(Box::new(|v: Option<i32>| -> anyhow::Result<Option<i32>> {
                Ok(v.map(|x| x * 2))
            })),
            StageOptions::new().fail_on(None),
        );
        assert!(matches!(stage.on_outcome(0, None), Signal::Failure(None)));
        assert!(matches!(stage.on_outcome(0, Some(3)), Signal::Outcome(Some(6))));
    }

    #[test]
    fn test_transform_error_raised() {
        let stage = transform(|_| Err(anyhow::anyhow!("bad input")));
        match stage.on_outcome(1, 5) {
            Signal::Error(e) => assert_eq!(e.to_string(), "bad input"),
            other => panic!("unexpected signal: {}", other.label()),
        }
    }

    #[test]
    fn test_transform_panic_raised() {
        let stage = transform(|_| panic!("exploded"));
        match stage.on_outcome(3, 5) {
            Signal::Error(e) => assert_eq!(e.to_string(), "Stage 3 panicked: exploded"),
            other => panic!("unexpected signal: {}", other.label()),
        }
    }

    #[test]
    fn test_consumer_forwards_input() {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let seen_clone = seen.clone();
        let stage = Stage::new(
            StageAction::Consume(Box::new(move |v: &i32| *seen_clone.lock() = Some(*v))),
            StageOptions::new(),
        );

        assert!(matches!(stage.on_outcome(0, 7), Signal::Outcome(7)));
        assert_eq!(*seen.lock(), Some(7));
    }

    #[test]
    fn test_non_recover_forwards_error() {
        let stage = transform(|v| Ok(v));
        assert!(matches!(
            stage.on_error(0, anyhow::anyhow!("e")),
            Signal::Error(_)
        ));
        assert!(matches!(stage.on_failure(4), Signal::Failure(4)));
    }

    #[test]
    fn test_recover_maps_error() {
        let stage = recover(|e| Ok(e.to_string().parse()?));
        assert!(matches!(stage.on_error(0, anyhow::anyhow!("8")), Signal::Outcome(8)));
        assert!(matches!(stage.on_outcome(0, 1), Signal::Outcome(1)));
    }

    #[test]
    fn test_failing_recover_wraps_with_suppressed() {
        let stage = recover(|e| Ok(e.to_string().parse()?));
        let Signal::Error(err) = stage.on_error(2, anyhow::anyhow!("not a number")) else {
            panic!("expected error");
        };

        match err.downcast_ref::<CompletesError>() {
            Some(CompletesError::Recovery(recovery)) => {
                assert_eq!(recovery.suppressed().to_string(), "not a number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_default_deadline_only_for_functions() {
        let mut stage = transform(|v| Ok(v));
        stage.set_default_deadline(Duration::from_millis(5));
        assert_eq!(stage.deadline(), Some(Duration::from_millis(5)));

        let mut gate: Stage<i32> = Stage::new(StageAction::Passthrough, StageOptions::new());
        gate.set_default_deadline(Duration::from_millis(5));
        assert_eq!(gate.deadline(), None);

        let mut explicit = Stage::new(
            StageAction::Transform(Box::new(|v: i32| -> anyhow::Result<i32> { Ok(v) })),
            StageOptions::new().within(Duration::from_millis(50)),
        );
        explicit.set_default_deadline(Duration::from_millis(5));
        assert_eq!(explicit.deadline(), Some(Duration::from_millis(50)));
    }
}
