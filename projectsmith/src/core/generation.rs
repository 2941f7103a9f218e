//! Generation results produced by the task executor.

use serde::{Deserialize, Serialize};

use super::ValidationStatus;
use crate::errors::ExecutionFailure;

/// A single file produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative path of the file.
    pub path: String,
    /// Normalized language tag (e.g. "python", "text").
    pub language: String,
    /// File content.
    pub content: String,
}

impl FileEntry {
    /// Creates a new file entry.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        language: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            content: content.into(),
        }
    }
}

/// The validation verdict for one extracted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCheck {
    /// Path of the checked entry.
    pub path: String,
    /// Language the validator was looked up by.
    pub language: String,
    /// The verdict.
    pub status: ValidationStatus,
    /// Diagnostic when the entry failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// The outcome of executing one sub-task.
///
/// A `Failed` status normally means every validation attempt was used. The
/// exception is a model call that could not be completed: generation stops at
/// that attempt, `failure` is set, and `attempts` may be below the configured
/// budget. Entries from an earlier attempt are kept in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// The sub-task this result belongs to.
    pub subtask_id: usize,
    /// The raw model output of the most recent attempt.
    pub raw_output: String,
    /// Files extracted from the most recent attempt.
    pub entries: Vec<FileEntry>,
    /// Per-entry verdicts for the most recent attempt.
    pub checks: Vec<EntryCheck>,
    /// Overall validation status.
    pub status: ValidationStatus,
    /// Number of generation attempts made, including one that ended in a model failure.
    pub attempts: usize,
    /// Diagnostics from every failed attempt, oldest first.
    #[serde(default)]
    pub diagnostics: Vec<String>,
    /// Set when a model call could not be completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
}

impl GenerationResult {
    /// Creates a result for a sub-task whose model call never produced content.
    #[must_use]
    pub fn from_failure(subtask_id: usize, attempts: usize, failure: ExecutionFailure) -> Self {
        Self {
            subtask_id,
            raw_output: String::new(),
            entries: Vec::new(),
            checks: Vec::new(),
            status: ValidationStatus::Failed,
            attempts,
            diagnostics: vec![failure.message.clone()],
            failure: Some(failure),
        }
    }

    /// Returns true if the content may be used without repair.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.status.is_acceptable()
    }

    /// Paths whose entries failed validation.
    #[must_use]
    pub fn failed_paths(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status == ValidationStatus::Failed)
            .map(|c| c.path.as_str())
            .collect()
    }

    /// Paths whose language had no validator.
    #[must_use]
    pub fn unvalidated_paths(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status == ValidationStatus::SkippedNoValidator)
            .map(|c| c.path.as_str())
            .collect()
    }

    /// The most recent diagnostic, if any.
    #[must_use]
    pub fn last_diagnostic(&self) -> Option<&str> {
        self.diagnostics.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str, status: ValidationStatus) -> EntryCheck {
        EntryCheck {
            path: path.to_string(),
            language: "python".to_string(),
            status,
            diagnostic: None,
        }
    }

    #[test]
    fn test_failed_and_unvalidated_paths() {
        let result = GenerationResult {
            subtask_id: 0,
            raw_output: String::new(),
            entries: Vec::new(),
            checks: vec![
                check("a.py", ValidationStatus::Passed),
                check("b.py", ValidationStatus::Failed),
                check("c.txt", ValidationStatus::SkippedNoValidator),
            ],
            status: ValidationStatus::Failed,
            attempts: 3,
            diagnostics: vec!["first".into(), "second".into()],
            failure: None,
        };

        assert_eq!(result.failed_paths(), vec!["b.py"]);
        assert_eq!(result.unvalidated_paths(), vec!["c.txt"]);
        assert_eq!(result.last_diagnostic(), Some("second"));
        assert!(!result.is_acceptable());
    }

    #[test]
    fn test_from_failure() {
        let failure = ExecutionFailure {
            subtask_id: 4,
            attempt: 1,
            message: "request rejected".into(),
            retryable: false,
        };
        let result = GenerationResult::from_failure(4, 1, failure);
        assert_eq!(result.status, ValidationStatus::Failed);
        assert!(result.entries.is_empty());
        assert_eq!(result.last_diagnostic(), Some("request rejected"));
    }
}
