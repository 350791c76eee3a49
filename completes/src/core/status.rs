//! Outcome state and stage kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of link a stage forms in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// A stage that maps the outcome to a new value.
    Transform,
    /// A stage that observes the outcome and forwards it unchanged.
    Consumer,
    /// A stage that maps a raised error back into a successful outcome.
    Recover,
    /// A stage without a function (sentinel or deadline gate only).
    Passthrough,
}

impl Default for StageKind {
    fn default() -> Self {
        Self::Transform
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transform => write!(f, "transform"),
            Self::Consumer => write!(f, "consumer"),
            Self::Recover => write!(f, "recover"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// The state of an outcome cell.
///
/// `Pending` moves to exactly one of the terminal states per completion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    /// No outcome has been written yet.
    Pending,
    /// The pipeline completed with a value.
    Succeeded,
    /// The pipeline completed with a business failure or an unrecovered error.
    Failed,
}

impl Default for OutcomeState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for OutcomeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl OutcomeState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the state indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the state indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Transform.to_string(), "transform");
        assert_eq!(StageKind::Consumer.to_string(), "consumer");
        assert_eq!(StageKind::Recover.to_string(), "recover");
        assert_eq!(StageKind::Passthrough.to_string(), "passthrough");
    }

    #[test]
    fn test_outcome_state_display() {
        assert_eq!(OutcomeState::Pending.to_string(), "pending");
        assert_eq!(OutcomeState::Succeeded.to_string(), "succeeded");
        assert_eq!(OutcomeState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_outcome_state_is_terminal() {
        assert!(OutcomeState::Succeeded.is_terminal());
        assert!(OutcomeState::Failed.is_terminal());
        assert!(!OutcomeState::Pending.is_terminal());
        assert!(OutcomeState::Failed.is_failure());
        assert!(!OutcomeState::Succeeded.is_failure());
    }

    #[test]
    fn test_outcome_state_serialize() {
        let json = serde_json::to_string(&OutcomeState::Succeeded).unwrap();
        assert_eq!(json, r#""succeeded""#);

        let deserialized: OutcomeState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, OutcomeState::Succeeded);
    }

    #[test]
    fn test_stage_kind_serialize() {
        let json = serde_json::to_string(&StageKind::Recover).unwrap();
        assert_eq!(json, r#""recover""#);
    }
}
