//! Pipeline builder with validation.

use super::completes::{Inner, OtherwiseFn};
use super::Completes;
use crate::config::CompletesConfig;
use crate::core::OutcomeCell;
use crate::errors::BuildError;
use crate::stages::{Stage, StageAction, StageOptions};
use crate::timer::Scheduler;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Registers stages in order, then builds a [`Completes`].
///
/// Every registration appends one stage to the end of the chain; the chain
/// never changes once built.
pub struct CompletesBuilder<T> {
    name: String,
    initial: T,
    already_complete: bool,
    stages: Vec<Stage<T>>,
    otherwise: Option<OtherwiseFn<T>>,
    duplicate_otherwise: bool,
    repeatable: bool,
    scheduler: Option<Arc<dyn Scheduler>>,
    default_deadline: Option<Duration>,
}

impl<T> CompletesBuilder<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a builder whose pipeline starts pending with `initial` as its
    /// current value.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            name: "completes".to_string(),
            initial,
            already_complete: false,
            stages: Vec::new(),
            otherwise: None,
            duplicate_otherwise: false,
            repeatable: false,
            scheduler: None,
            default_deadline: None,
        }
    }

    /// Starts the pipeline already succeeded with the initial value.
    ///
    /// The chain is bypassed entirely.
    #[must_use]
    pub fn already_complete(mut self, complete: bool) -> Self {
        self.already_complete = complete;
        self
    }

    /// Sets the name recorded in log spans.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the scheduler used to arm stage deadlines.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Applies name, repeat mode and default deadline from a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &CompletesConfig) -> Self {
        self.name.clone_from(&config.name);
        self.repeatable |= config.repeatable;
        self.default_deadline = config.default_deadline();
        self
    }

    /// Appends a transform stage.
    #[must_use]
    pub fn and_then<F>(self, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.and_then_infallible(StageOptions::new(), f)
    }

    /// Appends a transform stage that fails when its input equals `sentinel`.
    #[must_use]
    pub fn and_then_fail_on<F>(self, sentinel: T, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.and_then_infallible(StageOptions::new().fail_on(sentinel), f)
    }

    /// Appends a transform stage that fails unless it completes within `deadline`.
    #[must_use]
    pub fn and_then_within<F>(self, deadline: Duration, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.and_then_infallible(StageOptions::new().within(deadline), f)
    }

    /// Appends a transform stage with both a deadline and a sentinel.
    #[must_use]
    pub fn and_then_within_fail_on<F>(self, deadline: Duration, sentinel: T, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.and_then_infallible(StageOptions::new().within(deadline).fail_on(sentinel), f)
    }

    /// Appends a fallible transform stage; an `Err` becomes a raised error.
    #[must_use]
    pub fn and_then_try<F, E>(self, f: F) -> Self
    where
        F: Fn(T) -> Result<T, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        self.and_then_with(StageOptions::new(), f)
    }

    /// Appends a fallible transform stage with explicit options.
    #[must_use]
    pub fn and_then_with<F, E>(self, options: StageOptions<T>, f: F) -> Self
    where
        F: Fn(T) -> Result<T, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let action = StageAction::Transform(Box::new(move |value: T| -> anyhow::Result<T> {
            f(value).map_err(Into::into)
        }));
        self.push(Stage::new(action, options))
    }

    fn and_then_infallible<F>(self, options: StageOptions<T>, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        let action = StageAction::Transform(Box::new(move |value: T| -> anyhow::Result<T> {
            Ok(f(value))
        }));
        self.push(Stage::new(action, options))
    }

    /// Appends a consumer stage that observes the outcome and forwards it.
    #[must_use]
    pub fn and_then_consume<F>(self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.and_then_consume_with(StageOptions::new(), f)
    }

    /// Appends a consumer stage with explicit options.
    #[must_use]
    pub fn and_then_consume_with<F>(self, options: StageOptions<T>, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push(Stage::new(StageAction::Consume(Box::new(f)), options))
    }

    /// Appends a gate that fails when the outcome equals `sentinel`.
    #[must_use]
    pub fn fail_on(self, sentinel: T) -> Self {
        self.push(Stage::new(
            StageAction::Passthrough,
            StageOptions::new().fail_on(sentinel),
        ))
    }

    /// Appends a gate that fails unless the outcome reaches it within `deadline`.
    #[must_use]
    pub fn within(self, deadline: Duration) -> Self {
        self.push(Stage::new(
            StageAction::Passthrough,
            StageOptions::new().within(deadline),
        ))
    }

    /// Registers the handler for a failure that reaches the tail.
    ///
    /// The pipeline still settles as Failed; the handler's result becomes
    /// its outcome value.
    #[must_use]
    pub fn otherwise<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        if self.otherwise.is_some() {
            self.duplicate_otherwise = true;
        }
        self.otherwise = Some(Box::new(f));
        self
    }

    /// Appends a recover stage mapping a raised error to a successful outcome.
    #[must_use]
    pub fn recover_from<F>(self, f: F) -> Self
    where
        F: Fn(&anyhow::Error) -> T + Send + Sync + 'static,
    {
        self.try_recover_from(move |error| Ok::<_, anyhow::Error>(f(error)))
    }

    /// Appends a recover stage whose mapper may itself fail.
    ///
    /// A mapper error travels on as a new raised error that keeps the
    /// original as its suppressed cause.
    #[must_use]
    pub fn try_recover_from<F, E>(self, f: F) -> Self
    where
        F: Fn(&anyhow::Error) -> Result<T, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let action = StageAction::Recover(Box::new(move |error: &anyhow::Error| -> anyhow::Result<T> {
            f(error).map_err(Into::into)
        }));
        self.push(Stage::new(action, StageOptions::new()))
    }

    /// Makes the pipeline rewind after every completion.
    #[must_use]
    pub fn repeat(mut self) -> Self {
        self.repeatable = true;
        self
    }

    fn push(mut self, stage: Stage<T>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero deadline, a deadline without a scheduler,
    /// a second `otherwise`, or `repeat` on an already-complete pipeline.
    pub fn build(mut self) -> Result<Completes<T>, BuildError> {
        if self.repeatable && self.already_complete {
            return Err(BuildError::RepeatOnCompleted);
        }
        if self.duplicate_otherwise {
            return Err(BuildError::DuplicateOtherwise);
        }

        if let Some(deadline) = self.default_deadline {
            for stage in &mut self.stages {
                stage.set_default_deadline(deadline);
            }
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if let Some(deadline) = stage.deadline() {
                if deadline.is_zero() {
                    return Err(BuildError::ZeroDeadline { index });
                }
                if self.scheduler.is_none() {
                    return Err(BuildError::MissingScheduler { index, deadline });
                }
            }
        }

        let cell = if self.already_complete {
            OutcomeCell::completed(self.initial)
        } else {
            OutcomeCell::with_value(self.initial)
        };

        Ok(Completes::from_inner(Inner {
            id: Uuid::new_v4(),
            name: self.name,
            cell,
            chain: self.stages.into_boxed_slice(),
            otherwise: self.otherwise,
            repeatable: self.repeatable,
            scheduler: self.scheduler,
            armed_head: Mutex::new(None),
        }))
    }
}

impl<T> std::fmt::Debug for CompletesBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletesBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .field("repeatable", &self.repeatable)
            .field("already_complete", &self.already_complete)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeState;
    use crate::testing::ManualScheduler;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_counts_stages() {
        let builder = CompletesBuilder::new(0)
            .and_then(|v| v)
            .and_then_consume(|_| {})
            .recover_from(|_| 0);
        assert_eq!(builder.stage_count(), 3);
    }

    #[test]
    fn test_deadline_requires_scheduler() {
        let err = CompletesBuilder::new(0)
            .and_then(|v| v)
            .and_then_within(Duration::from_millis(10), |v| v)
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            BuildError::MissingScheduler {
                index: 1,
                deadline: Duration::from_millis(10),
            }
        );
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let err = CompletesBuilder::new(0)
            .with_scheduler(Arc::new(ManualScheduler::new()))
            .within(Duration::ZERO)
            .build()
            .unwrap_err();

        assert_eq!(err, BuildError::ZeroDeadline { index: 0 });
    }

    #[test]
    fn test_duplicate_otherwise_rejected() {
        let err = CompletesBuilder::new(0)
            .otherwise(|v| v)
            .otherwise(|v| v)
            .build()
            .unwrap_err();

        assert_eq!(err, BuildError::DuplicateOtherwise);
    }

    #[test]
    fn test_repeat_on_completed_rejected() {
        let err = CompletesBuilder::new(0)
            .already_complete(true)
            .repeat()
            .build()
            .unwrap_err();

        assert_eq!(err, BuildError::RepeatOnCompleted);
    }

    #[test]
    fn test_already_complete_starts_succeeded() {
        let completes = CompletesBuilder::new(5)
            .and_then(|v| v * 100)
            .already_complete(true)
            .build()
            .unwrap();

        assert_eq!(completes.state(), OutcomeState::Succeeded);
        assert_eq!(completes.current_value(), Some(5));
    }

    #[test]
    fn test_repeat_before_stages() {
        let completes = CompletesBuilder::new(0).repeat().and_then(|v| v).build().unwrap();
        assert!(completes.is_repeatable());
    }

    #[test]
    fn test_config_applies_default_deadline() {
        let scheduler = Arc::new(ManualScheduler::new());
        let config = CompletesConfig::new()
            .with_name("configured")
            .with_repeatable(true)
            .with_default_deadline_ms(30);

        let completes = CompletesBuilder::new(0)
            .with_config(&config)
            .with_scheduler(scheduler.clone())
            .and_then(|v| v + 1)
            .build()
            .unwrap();

        assert_eq!(completes.name(), "configured");
        assert!(completes.is_repeatable());
        // The head picked up the default deadline and was armed at build time
        assert_eq!(scheduler.scheduled(), 1);
    }

    #[test]
    fn test_config_deadline_without_scheduler_rejected() {
        let config = CompletesConfig::new().with_default_deadline_ms(30);
        let err = CompletesBuilder::new(0)
            .with_config(&config)
            .and_then(|v| v)
            .build()
            .unwrap_err();

        assert!(matches!(err, BuildError::MissingScheduler { index: 0, .. }));
    }
}
