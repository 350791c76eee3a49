//! Configuration types for pipelines and schedulers.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration applied when building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletesConfig {
    /// Name recorded in log spans.
    #[serde(default = "default_name")]
    pub name: String,
    /// Whether pipelines rewind after each completion.
    #[serde(default)]
    pub repeatable: bool,
    /// Deadline applied to transform and consumer stages that set none.
    #[serde(default)]
    pub default_deadline_ms: Option<u64>,
    /// Timer thread settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_name() -> String {
    "completes".to_string()
}

impl Default for CompletesConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            repeatable: false,
            default_deadline_ms: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl CompletesConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Marks pipelines as repeatable.
    #[must_use]
    pub fn with_repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    /// Sets the default stage deadline.
    #[must_use]
    pub fn with_default_deadline_ms(mut self, ms: u64) -> Self {
        self.default_deadline_ms = Some(ms);
        self
    }

    /// Gets the default stage deadline as a Duration.
    #[must_use]
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_deadline_ms == Some(0) {
            return Err(ConfigError::invalid(
                "default_deadline_ms",
                "must be greater than zero",
            ));
        }
        self.scheduler.validate()
    }
}

/// Configuration for the dedicated timer thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name given to the timer thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_thread_name() -> String {
    "completes-timer".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

impl SchedulerConfig {
    /// Sets the timer thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::invalid("scheduler.thread_name", "must not be empty"));
        }
        Ok(())
    }
}
