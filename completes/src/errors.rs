//! Error types for the completes crate.
//!
//! Business failures (a sentinel match or an expired deadline) are not errors
//! at all; they are a Failed outcome. The types here cover raised errors that
//! travel down a pipeline, and misuse caught while building one.

use std::time::Duration;
use thiserror::Error;

/// The main error type for completes operations.
#[derive(Debug, Error)]
pub enum CompletesError {
    /// A stage function or recovery mapper panicked.
    #[error("Stage {index} panicked: {message}")]
    StagePanicked {
        /// Position of the stage in the chain.
        index: usize,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// A recovery mapper failed while handling a raised error.
    #[error("{0}")]
    Recovery(#[from] RecoveryError),

    /// The pipeline could not be built.
    #[error("{0}")]
    Build(#[from] BuildError),

    /// The configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl CompletesError {
    /// Creates a stage panic error from a caught panic payload.
    #[must_use]
    pub fn from_panic(index: usize, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::StagePanicked { index, message }
    }
}

/// Error raised when a recovery mapper itself fails.
///
/// The mapper's error is the source; the error it was trying to recover
/// from is kept as the suppressed cause.
#[derive(Debug, Error)]
#[error("Recovery failed: {source}")]
pub struct RecoveryError {
    /// The error produced by the recovery mapper.
    #[source]
    pub source: anyhow::Error,
    /// The raised error the mapper was handling.
    pub suppressed: anyhow::Error,
}

impl RecoveryError {
    /// Creates a new recovery error.
    #[must_use]
    pub fn new(source: anyhow::Error, suppressed: anyhow::Error) -> Self {
        Self { source, suppressed }
    }

    /// Returns the error that was being recovered from.
    #[must_use]
    pub fn suppressed(&self) -> &anyhow::Error {
        &self.suppressed
    }
}

/// Errors detected while building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A stage was given a zero deadline.
    #[error("Stage {index} has a zero deadline")]
    ZeroDeadline {
        /// Position of the stage in the chain.
        index: usize,
    },

    /// A stage has a deadline but no scheduler was provided.
    #[error("Stage {index} has a deadline of {deadline:?} but no scheduler was configured")]
    MissingScheduler {
        /// Position of the stage in the chain.
        index: usize,
        /// The requested deadline.
        deadline: Duration,
    },

    /// `otherwise` was registered more than once.
    #[error("A failure handler is already registered")]
    DuplicateOtherwise,

    /// `repeat` was requested on a pipeline constructed as already complete.
    #[error("An already-complete pipeline cannot repeat")]
    RepeatOnCompleted,
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value is out of range.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
