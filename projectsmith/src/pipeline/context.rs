//! Per-run state threaded through the driver.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::{Degradation, GenerationResult, Objective, RunState, SubTask, ValidationStatus};
use crate::events::{LogStage, RunLog, StageRecord};

/// Everything one run has accumulated so far.
///
/// The state only moves along [`RunState::can_transition_to`]; each move is
/// recorded in the run log.
#[derive(Debug)]
pub struct RunContext {
    /// The caller's objective.
    pub objective: Objective,
    /// This run's id.
    pub run_id: Uuid,
    /// The shared run log.
    pub run_log: Arc<RunLog>,
    state: RunState,
    /// Decomposed sub-tasks.
    pub subtasks: Vec<SubTask>,
    /// Generation results, in sub-task order.
    pub results: Vec<GenerationResult>,
    /// Run-level search context, if search ran.
    pub search_context: Option<String>,
    /// Degradations recorded so far.
    pub degradations: Vec<Degradation>,
}

impl RunContext {
    /// Starts a run in [`RunState::Decomposing`].
    #[must_use]
    pub fn new(objective: Objective, run_log: Arc<RunLog>) -> Self {
        let ctx = Self {
            objective,
            run_id: run_log.run_id(),
            run_log,
            state: RunState::Decomposing,
            subtasks: Vec::new(),
            results: Vec::new(),
            search_context: None,
            degradations: Vec::new(),
        };
        ctx.run_log.append(
            StageRecord::new(LogStage::Driver, "driver.started")
                .input(&ctx.objective.text)
                .data(json!({
                    "state": ctx.state,
                    "use_search": ctx.objective.use_search,
                    "has_attachment": ctx.objective.attachment.is_some(),
                })),
        );
        ctx
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Moves to `next` if the transition is allowed.
    ///
    /// Returns false, logs, and leaves the state unchanged otherwise.
    pub fn transition(&mut self, next: RunState) -> bool {
        let from = self.state;
        if !from.can_transition_to(next) {
            error!(run_id = %self.run_id, %from, to = %next, "Invalid run state transition");
            self.run_log.append(
                StageRecord::new(LogStage::Driver, "driver.invalid_transition")
                    .error(format!("{from} -> {next} is not allowed"))
                    .data(json!({ "from": from, "to": next })),
            );
            return false;
        }

        self.state = next;
        info!(run_id = %self.run_id, %from, to = %next, "Run state changed");
        self.run_log.append(
            StageRecord::new(LogStage::Driver, "driver.transition").data(json!({
                "from": from,
                "to": next,
                "degraded": self.is_degraded(),
            })),
        );
        true
    }

    /// Records a degradation.
    pub fn degrade(&mut self, degradation: Degradation) {
        tracing::warn!(run_id = %self.run_id, "Run degraded: {}", degradation.describe());
        self.run_log.append(
            StageRecord::new(LogStage::Driver, "driver.degraded")
                .error(degradation.describe())
                .data(json!(degradation)),
        );
        self.degradations.push(degradation);
    }

    /// Records a degradation for every result that could not be used as is.
    pub fn degrade_failed_results(&mut self) {
        let degradations: Vec<Degradation> = self
            .results
            .iter()
            .filter(|r| r.status == ValidationStatus::Failed)
            .map(|r| {
                let title = self
                    .subtasks
                    .iter()
                    .find(|t| t.id == r.subtask_id)
                    .map(|t| t.title.clone())
                    .unwrap_or_default();
                match r.failure {
                    Some(ref failure) => Degradation::ExecutionFailed {
                        subtask_id: r.subtask_id,
                        title,
                        message: failure.message.clone(),
                    },
                    None => Degradation::ValidationFailed {
                        subtask_id: r.subtask_id,
                        title,
                        diagnostic: r.last_diagnostic().unwrap_or("validation failed").to_string(),
                    },
                }
            })
            .collect();
        for degradation in degradations {
            self.degrade(degradation);
        }
    }

    /// Returns true if any degradation was recorded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}
