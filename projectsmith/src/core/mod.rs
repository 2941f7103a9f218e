//! Core domain model types for projectsmith.
//!
//! This module contains the values that flow between stages:
//! - The objective and its decomposed sub-tasks
//! - Per-task generation results and their validation status
//! - The refined deliverable and the run result

mod generation;
mod objective;
mod refined;
mod run_result;
mod status;
mod task;

pub use generation::{EntryCheck, FileEntry, GenerationResult};
pub use objective::Objective;
pub use refined::{MergeMode, PathConflicts, RefinedOutput};
pub use run_result::{Degradation, RunResult};
pub use status::{RunState, ValidationStatus};
pub use task::SubTask;
