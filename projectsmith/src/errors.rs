//! Error types for the projectsmith pipeline.
//!
//! Fatal errors (`DecompositionError`, `MaterializeError`) abort a run and are
//! surfaced through [`PipelineError`]. Non-fatal failures (`ExecutionFailure`,
//! `RefinementError`) are absorbed by the driver and degrade the deliverable.
//! Validation failure is not an error at all: it is a
//! [`ValidationStatus`](crate::core::ValidationStatus) value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::retry::Retryable;

/// The main error type for fatal pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The objective could not be decomposed into sub-tasks.
    #[error("{0}")]
    Decomposition(#[from] DecompositionError),

    /// The refined output could not be written to disk.
    #[error("{0}")]
    Materialize(#[from] MaterializeError),

    /// The pipeline was configured inconsistently.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Short machine-readable code for the error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decomposition(_) => "DECOMPOSITION_FAILED",
            Self::Materialize(_) => "MATERIALIZE_FAILED",
            Self::Config(_) => "INVALID_CONFIG",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors returned by a language-model client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    /// The request never reached the provider or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded its per-call timeout.
    #[error("model call timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The provider throttled the request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider failed with a server-side status.
    #[error("provider error (HTTP {status}): {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider rejected the request as malformed or unauthorized.
    #[error("request rejected (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider answered with a body that could not be understood.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The client itself is misconfigured (missing key, bad endpoint).
    #[error("client configuration error: {0}")]
    Configuration(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout { .. }
                | Self::RateLimited(_)
                | Self::Server { .. }
                | Self::InvalidResponse(_)
        )
    }
}

/// Errors returned by a web-search client.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The search request failed in transit.
    #[error("search transport error: {0}")]
    Transport(String),

    /// The search provider answered with an error status.
    #[error("search provider error (HTTP {status}): {body}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The search response could not be decoded.
    #[error("invalid search response: {0}")]
    InvalidResponse(String),

    /// The search client is misconfigured.
    #[error("search configuration error: {0}")]
    Configuration(String),
}

/// Why a stage's model output could not be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageCallError {
    /// The model call failed.
    #[error(transparent)]
    Model(#[from] LlmError),

    /// The model answered, but the answer did not match the expected shape.
    #[error("malformed model output: {0}")]
    Malformed(String),
}

impl Retryable for StageCallError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Model(e) => e.is_retryable(),
            Self::Malformed(_) => true,
        }
    }
}

/// Fatal: the objective could not be turned into any sub-tasks.
#[derive(Debug, Clone, Error)]
#[error("decomposition failed after {attempts} attempt(s): {source}")]
pub struct DecompositionError {
    /// The last failure observed.
    #[source]
    pub source: StageCallError,
    /// How many model calls were made.
    pub attempts: usize,
}

impl DecompositionError {
    /// Creates a new decomposition error.
    #[must_use]
    pub fn new(source: StageCallError, attempts: usize) -> Self {
        Self { source, attempts }
    }
}

/// Non-fatal: the refiner's output could not be used, so the driver merges mechanically.
#[derive(Debug, Clone, Error)]
#[error("refinement failed after {attempts} attempt(s): {source}")]
pub struct RefinementError {
    /// The last failure observed.
    #[source]
    pub source: StageCallError,
    /// How many model calls were made.
    pub attempts: usize,
}

impl RefinementError {
    /// Creates a new refinement error.
    #[must_use]
    pub fn new(source: StageCallError, attempts: usize) -> Self {
        Self { source, attempts }
    }
}

/// Non-fatal, per-task: the model call for a sub-task could not be completed.
///
/// This is recorded on the [`GenerationResult`](crate::core::GenerationResult)
/// rather than propagated.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("sub-task {subtask_id} execution failed on attempt {attempt}: {message}")]
pub struct ExecutionFailure {
    /// The sub-task that failed.
    pub subtask_id: usize,
    /// The validation attempt during which the model call failed (1-based).
    pub attempt: usize,
    /// Human-readable failure description.
    pub message: String,
    /// Whether the underlying failure was transient.
    pub retryable: bool,
}

impl ExecutionFailure {
    /// Creates an execution failure from a model error.
    #[must_use]
    pub fn from_llm(subtask_id: usize, attempt: usize, error: &LlmError) -> Self {
        Self {
            subtask_id,
            attempt,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Fatal: the deliverable could not be written.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// A filesystem operation failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        /// What was being attempted (e.g. "create directory").
        action: &'static str,
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A file entry violated the unique, non-empty path invariant.
    #[error("invalid file entry '{path}': {reason}")]
    InvalidEntry {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The run log could not be serialized.
    #[error("failed to serialize run log: {0}")]
    Serialization(String),
}

impl MaterializeError {
    /// Creates an IO error with context.
    #[must_use]
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid entry error.
    #[must_use]
    pub fn invalid_entry(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// The config path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// An environment override held an unusable value.
    #[error("invalid value for {key}: {value}")]
    InvalidEnv {
        /// The environment variable name.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// A config value is outside its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised when resolving a path inside a run directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path is empty after normalization.
    #[error("path is empty")]
    Empty,

    /// The path escapes its root.
    #[error("path '{0}' escapes the run directory")]
    Traversal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_retry_classification() {
        assert!(LlmError::Transport("reset".into()).is_retryable());
        assert!(LlmError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(LlmError::RateLimited("slow down".into()).is_retryable());
        assert!(LlmError::Server { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Rejected { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::Configuration("no key".into()).is_retryable());
    }

    #[test]
    fn test_stage_call_error_malformed_is_retryable() {
        assert!(StageCallError::Malformed("no tasks".into()).is_retryable());
        assert!(!StageCallError::Model(LlmError::Rejected {
            status: 401,
            body: "unauthorized".into(),
        })
        .is_retryable());
    }

    #[test]
    fn test_decomposition_error_message() {
        let err = DecompositionError::new(StageCallError::Malformed("empty task list".into()), 3);
        let msg = err.to_string();
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("empty task list"));
    }

    #[test]
    fn test_pipeline_error_to_dict() {
        let err = PipelineError::from(MaterializeError::invalid_entry("", "empty path"));
        let dict = err.to_dict();
        assert_eq!(dict.get("code").unwrap(), "MATERIALIZE_FAILED");
    }

    #[test]
    fn test_execution_failure_from_llm() {
        let failure = ExecutionFailure::from_llm(2, 1, &LlmError::Timeout { timeout_ms: 500 });
        assert_eq!(failure.subtask_id, 2);
        assert!(failure.retryable);
        assert!(failure.to_string().contains("timed out"));
    }
}
