//! Validation status and run state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of validating a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Every entry with a registered validator passed.
    Passed,
    /// At least one entry failed its validator.
    Failed,
    /// No entry had a registered validator.
    SkippedNoValidator,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::SkippedNoValidator => write!(f, "skipped_no_validator"),
        }
    }
}

impl ValidationStatus {
    /// Returns true if the content may be trusted by the pipeline.
    ///
    /// Unvalidated content counts as passing; it is only flagged in the log.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Self::Passed | Self::SkippedNoValidator)
    }

    /// Folds per-entry statuses into one generation status.
    ///
    /// Any failure wins, then any pass; an empty or all-skipped set is skipped.
    #[must_use]
    pub fn combine<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut combined = Self::SkippedNoValidator;
        for status in statuses {
            match status {
                Self::Failed => return Self::Failed,
                Self::Passed => combined = Self::Passed,
                Self::SkippedNoValidator => {}
            }
        }
        combined
    }
}

/// The state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Turning the objective into sub-tasks.
    Decomposing,
    /// Generating content for each sub-task.
    Executing,
    /// Merging generations into one deliverable.
    Refining,
    /// Writing the deliverable to disk.
    Materializing,
    /// The run completed, possibly degraded.
    Done,
    /// The run aborted.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decomposing => write!(f, "decomposing"),
            Self::Executing => write!(f, "executing"),
            Self::Refining => write!(f, "refining"),
            Self::Materializing => write!(f, "materializing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the run may move from `self` to `next`.
    ///
    /// `Failed` is only reachable from `Decomposing` and `Materializing`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Decomposing, Self::Executing | Self::Failed)
                | (Self::Executing, Self::Refining)
                | (Self::Refining, Self::Materializing)
                | (Self::Materializing, Self::Done | Self::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_status_display() {
        assert_eq!(ValidationStatus::Passed.to_string(), "passed");
        assert_eq!(ValidationStatus::Failed.to_string(), "failed");
        assert_eq!(
            ValidationStatus::SkippedNoValidator.to_string(),
            "skipped_no_validator"
        );
    }

    #[test]
    fn test_validation_status_combine() {
        use ValidationStatus::*;
        assert_eq!(ValidationStatus::combine([]), SkippedNoValidator);
        assert_eq!(ValidationStatus::combine([SkippedNoValidator, Passed]), Passed);
        assert_eq!(ValidationStatus::combine([Passed, Failed, Passed]), Failed);
        assert_eq!(
            ValidationStatus::combine([SkippedNoValidator, SkippedNoValidator]),
            SkippedNoValidator
        );
    }

    #[test]
    fn test_skipped_counts_as_acceptable() {
        assert!(ValidationStatus::SkippedNoValidator.is_acceptable());
        assert!(!ValidationStatus::Failed.is_acceptable());
    }

    #[test]
    fn test_run_state_transitions() {
        use RunState::*;
        assert!(Decomposing.can_transition_to(Executing));
        assert!(Decomposing.can_transition_to(Failed));
        assert!(!Executing.can_transition_to(Failed));
        assert!(!Refining.can_transition_to(Failed));
        assert!(Materializing.can_transition_to(Failed));
        assert!(Materializing.can_transition_to(Done));
        assert!(!Done.can_transition_to(Decomposing));
        assert!(Done.is_terminal());
    }

    #[test]
    fn test_run_state_serialize() {
        let json = serde_json::to_string(&RunState::Materializing).unwrap();
        assert_eq!(json, r#""materializing""#);
    }
}
