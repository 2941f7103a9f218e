//! Sub-task execution with validation and regeneration.

use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use super::calls::{complete_logged, search_context};
use super::ports::StagePorts;
use super::prompts::{ExecutorPrompt, CONTINUATION, EXECUTOR_SYSTEM};
use crate::core::{EntryCheck, FileEntry, GenerationResult, Objective, SubTask, ValidationStatus};
use crate::errors::{ExecutionFailure, LlmError};
use crate::events::{LogStage, StageRecord};
use crate::llm::{ChatMessage, CompletionRequest};
use crate::parsing::{into_entries, parse_blocks, EntryNaming};

const EMPTY_RESPONSE: &str = "the response contained no content";

/// One sub-task and the run context it executes in.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionInput<'a> {
    /// The run's objective.
    pub objective: &'a Objective,
    /// The task to execute.
    pub task: &'a SubTask,
    /// Every decomposed task.
    pub all_tasks: &'a [SubTask],
    /// Run-level search context, used when the task has no query of its own.
    pub search_context: Option<&'a str>,
    /// Whether the objective's attachment goes into the prompt.
    pub include_attachment: bool,
}

/// Generates and validates the content of sub-tasks.
///
/// A generation whose entries fail validation is regenerated in full, with the
/// diagnostics appended to the prompt, up to `validation_attempts` times. The
/// executor never fails: exhausted budgets and failed model calls are reported
/// in the returned [`GenerationResult`].
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    ports: StagePorts,
}

impl TaskExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(ports: StagePorts) -> Self {
        Self { ports }
    }

    /// Executes every task, at most `max_concurrent_tasks` at a time.
    ///
    /// Results come back in task order. Only the first task sees the attachment.
    pub async fn execute_all(
        &self,
        objective: &Objective,
        tasks: &[SubTask],
        search: Option<&str>,
    ) -> Vec<GenerationResult> {
        let limit = self.ports.config.max_concurrent_tasks.max(1);
        stream::iter(tasks.iter().enumerate())
            .map(|(index, task)| {
                self.execute(ExecutionInput {
                    objective,
                    task,
                    all_tasks: tasks,
                    search_context: search,
                    include_attachment: index == 0,
                })
            })
            .buffered(limit)
            .collect()
            .await
    }

    /// Executes one task.
    pub async fn execute(&self, input: ExecutionInput<'_>) -> GenerationResult {
        let task = input.task;
        let config = &self.ports.config;

        let own_search = match task.search_query {
            Some(ref query) if input.objective.use_search => {
                search_context(&self.ports, query, Some(task.id)).await
            }
            _ => None,
        };
        let search = own_search.as_deref().or(input.search_context);

        let mut diagnostics: Vec<String> = Vec::new();
        let mut latest: Option<GenerationResult> = None;

        for attempt in 1..=config.validation_attempts {
            self.ports.run_log.append(
                StageRecord::new(LogStage::Execute, "execute.attempt")
                    .task(task.id)
                    .input(&task.title)
                    .data(json!({ "attempt": attempt, "prior_diagnostics": diagnostics.len() })),
            );

            let prompt = ExecutorPrompt {
                objective: input.objective,
                task,
                all_tasks: input.all_tasks,
                search,
                include_attachment: input.include_attachment,
                diagnostics: &diagnostics,
            }
            .render();
            let request = CompletionRequest::new(config.models.executor.clone(), EXECUTOR_SYSTEM, prompt)
                .with_max_tokens(config.models.max_tokens)
                .with_temperature(config.models.temperature);

            let raw = match self.generate(task.id, request).await {
                Ok(raw) => raw,
                Err(error) => return self.model_failure(task, attempt, &error, latest, diagnostics),
            };

            let mut result = self.evaluate(task, raw, attempt);
            if result.is_acceptable() {
                result.diagnostics = diagnostics;
                self.log_completed(task, &result);
                return result;
            }

            let failed: Vec<String> = if result.entries.is_empty() {
                vec![EMPTY_RESPONSE.to_string()]
            } else {
                result
                    .checks
                    .iter()
                    .filter(|c| c.status == ValidationStatus::Failed)
                    .map(|c| format!("{}: {}", c.path, c.diagnostic.as_deref().unwrap_or("invalid")))
                    .collect()
            };
            debug!(task_id = task.id, attempt, ?failed, "Generation failed validation");
            self.ports.run_log.append(
                StageRecord::new(LogStage::Execute, "execute.validation_failed")
                    .task(task.id)
                    .error(failed.join("; "))
                    .data(json!({ "attempt": attempt, "failed_paths": result.failed_paths() })),
            );
            diagnostics.extend(failed);
            result.diagnostics.clone_from(&diagnostics);
            latest = Some(result);
        }

        match latest {
            Some(result) => {
                warn!(
                    task_id = task.id,
                    attempts = result.attempts,
                    "Validation budget exhausted; keeping the latest generation"
                );
                self.ports.run_log.append(
                    StageRecord::new(LogStage::Execute, "execute.exhausted")
                        .task(task.id)
                        .error(result.last_diagnostic().unwrap_or(EMPTY_RESPONSE))
                        .data(json!({ "attempts": result.attempts })),
                );
                result
            }
            None => GenerationResult::from_failure(
                task.id,
                0,
                ExecutionFailure {
                    subtask_id: task.id,
                    attempt: 0,
                    message: "no generation attempts were allowed".into(),
                    retryable: false,
                },
            ),
        }
    }

    /// One generation, extended by continuations while the model hits its token cap.
    async fn generate(&self, task_id: usize, request: CompletionRequest) -> Result<String, LlmError> {
        let mut completion = complete_logged(&self.ports, LogStage::Execute, Some(task_id), &request)
            .await
            .map_err(|failure| failure.error)?
            .value;
        let mut content = std::mem::take(&mut completion.content);
        let mut continuations = 0;

        while completion.is_truncated() && continuations < self.ports.config.max_continuations {
            continuations += 1;
            self.ports.run_log.append(
                StageRecord::new(LogStage::Execute, "execute.continuation")
                    .task(task_id)
                    .data(json!({ "continuation": continuations, "chars_so_far": content.len() })),
            );
            let follow_up = request
                .clone()
                .with_message(ChatMessage::assistant(content.clone()))
                .with_message(ChatMessage::user(CONTINUATION));

            match complete_logged(&self.ports, LogStage::Execute, Some(task_id), &follow_up).await {
                Ok(retried) => {
                    completion = retried.value;
                    content.push_str(&completion.content);
                }
                Err(failure) => {
                    warn!(task_id, error = %failure.error, "Continuation failed; keeping partial output");
                    break;
                }
            }
        }
        Ok(content)
    }

    fn evaluate(&self, task: &SubTask, raw: String, attempt: usize) -> GenerationResult {
        let entries = if raw.trim().is_empty() {
            Vec::new()
        } else {
            into_entries(
                &parse_blocks(&raw),
                EntryNaming {
                    task_id: task.id,
                    target_path: task.target_path.as_deref(),
                    language_hint: task.language.as_deref(),
                },
            )
        };
        let checks = self.check(&entries);
        let status = if entries.is_empty() {
            ValidationStatus::Failed
        } else {
            ValidationStatus::combine(checks.iter().map(|c| c.status))
        };

        GenerationResult {
            subtask_id: task.id,
            raw_output: raw,
            entries,
            checks,
            status,
            attempts: attempt,
            diagnostics: Vec::new(),
            failure: None,
        }
    }

    fn check(&self, entries: &[FileEntry]) -> Vec<EntryCheck> {
        entries
            .iter()
            .map(|entry| {
                let outcome = self.ports.validators.validate(&entry.language, &entry.content);
                EntryCheck {
                    path: entry.path.clone(),
                    language: entry.language.clone(),
                    status: outcome.status(),
                    diagnostic: outcome.diagnostic().map(ToString::to_string),
                }
            })
            .collect()
    }

    fn model_failure(
        &self,
        task: &SubTask,
        attempt: usize,
        error: &LlmError,
        latest: Option<GenerationResult>,
        mut diagnostics: Vec<String>,
    ) -> GenerationResult {
        let failure = ExecutionFailure::from_llm(task.id, attempt, error);
        warn!(task_id = task.id, attempt, error = %error, "Sub-task model call failed");
        self.ports.run_log.append(
            StageRecord::new(LogStage::Execute, "execute.failed")
                .task(task.id)
                .error(error)
                .data(json!({ "attempt": attempt, "retryable": failure.retryable })),
        );

        match latest {
            Some(mut previous) => {
                diagnostics.push(failure.message.clone());
                previous.status = ValidationStatus::Failed;
                previous.attempts = attempt;
                previous.diagnostics = diagnostics;
                previous.failure = Some(failure);
                previous
            }
            None => GenerationResult::from_failure(task.id, attempt, failure),
        }
    }

    fn log_completed(&self, task: &SubTask, result: &GenerationResult) {
        let unvalidated = result.unvalidated_paths();
        if !unvalidated.is_empty() {
            debug!(task_id = task.id, ?unvalidated, "Entries without a validator");
        }
        info!(
            task_id = task.id,
            status = %result.status,
            attempts = result.attempts,
            files = result.entries.len(),
            "Sub-task generated"
        );
        self.ports.run_log.append(
            StageRecord::new(LogStage::Execute, "execute.completed")
                .task(task.id)
                .output(
                    result
                        .entries
                        .iter()
                        .map(|e| e.path.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                )
                .data(json!({
                    "status": result.status,
                    "attempts": result.attempts,
                    "unvalidated_paths": unvalidated,
                })),
        );
    }
}
