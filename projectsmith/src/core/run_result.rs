//! The externally visible outcome of a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::RunState;

/// Why a completed run is degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// A sub-task's content still failed validation after its attempt budget.
    ValidationFailed {
        /// The sub-task id.
        subtask_id: usize,
        /// The sub-task title.
        title: String,
        /// The last diagnostic.
        diagnostic: String,
    },
    /// A sub-task's model call could not be completed.
    ExecutionFailed {
        /// The sub-task id.
        subtask_id: usize,
        /// The sub-task title.
        title: String,
        /// The failure message.
        message: String,
    },
    /// The refiner failed and the deliverable was merged mechanically.
    MechanicalMerge {
        /// The refinement failure.
        reason: String,
    },
}

impl Degradation {
    /// One-line description for narratives and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::ValidationFailed {
                subtask_id,
                title,
                diagnostic,
            } => format!("task {subtask_id} ({title}) failed validation: {diagnostic}"),
            Self::ExecutionFailed {
                subtask_id,
                title,
                message,
            } => format!("task {subtask_id} ({title}) could not be generated: {message}"),
            Self::MechanicalMerge { reason } => {
                format!("output was merged mechanically: {reason}")
            }
        }
    }
}

/// The result of one successful (possibly degraded) run.
///
/// Serializes with the `refined_output`, `created_files` and `log_file` keys the
/// HTTP collaborator returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// The refined narrative.
    pub refined_output: String,
    /// Paths of every file written, in refined order.
    pub created_files: Vec<PathBuf>,
    /// Path of the run log.
    pub log_file: PathBuf,
    /// The run directory.
    pub run_dir: PathBuf,
    /// Sanitized project name.
    pub project_name: String,
    /// Final state (always `Done` for a returned result).
    pub state: RunState,
    /// True if any stage fell back to a lower-quality result.
    #[serde(default)]
    pub degraded: bool,
    /// Every degradation that happened along the way.
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

impl RunResult {
    /// Returns true if any stage fell back to a lower-quality result.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded || !self.degradations.is_empty()
    }
}
