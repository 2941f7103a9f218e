//! Objective decomposition.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::calls::complete_parsed;
use super::ports::StagePorts;
use super::prompts::{decomposer_prompt, DECOMPOSER_SYSTEM};
use crate::core::{Objective, SubTask};
use crate::errors::{DecompositionError, StageCallError};
use crate::events::{LogStage, StageRecord};
use crate::llm::CompletionRequest;
use crate::parsing::json_values;

/// Longest title derived from a description.
const DERIVED_TITLE_CHARS: usize = 60;

#[derive(Debug, Deserialize)]
struct TaskList {
    tasks: Vec<RawTask>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTask {
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "target_path", alias = "file")]
    path: Option<String>,
    language: Option<String>,
    search_query: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses the decomposer's answer into ordered sub-tasks with ids `0..n`.
///
/// Accepts `{"tasks": [...]}` or a bare array anywhere in the text. JSON values
/// that are not a usable task list (such as `[1]` in surrounding prose) are
/// skipped. Tasks with neither title nor description are dropped; an empty
/// result is malformed.
pub fn parse_tasks(text: &str) -> Result<Vec<SubTask>, StageCallError> {
    let mut first_error = None;
    for value in json_values(text) {
        match tasks_from_value(value) {
            Ok(tasks) => return Ok(tasks),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error
        .unwrap_or_else(|| StageCallError::Malformed("no JSON task list in response".into())))
}

fn tasks_from_value(value: Value) -> Result<Vec<SubTask>, StageCallError> {
    let raw: Vec<RawTask> = match value {
        Value::Array(_) => serde_json::from_value(value),
        Value::Object(_) => serde_json::from_value::<TaskList>(value).map(|list| list.tasks),
        _ => {
            return Err(StageCallError::Malformed(
                "task list is not an object or array".into(),
            ))
        }
    }
    .map_err(|e| StageCallError::Malformed(format!("invalid task list: {e}")))?;

    let tasks: Vec<SubTask> = raw
        .into_iter()
        .filter_map(|task| {
            let description = non_empty(task.description);
            let title = non_empty(task.title).or_else(|| {
                description
                    .as_deref()
                    .map(|d| d.chars().take(DERIVED_TITLE_CHARS).collect::<String>())
            })?;
            Some((title, description, task.path, task.language, task.search_query))
        })
        .enumerate()
        .map(|(id, (title, description, path, language, query))| {
            let description = description.unwrap_or_else(|| title.clone());
            let mut task = SubTask::new(id, title, description);
            task.target_path = non_empty(path);
            task.language = non_empty(language);
            task.search_query = non_empty(query);
            task
        })
        .collect();

    if tasks.is_empty() {
        return Err(StageCallError::Malformed("task list is empty".into()));
    }
    Ok(tasks)
}

/// Turns an objective into at most `max_tasks` sub-tasks.
#[derive(Debug, Clone)]
pub struct Decomposer {
    ports: StagePorts,
}

impl Decomposer {
    /// Creates a decomposer.
    #[must_use]
    pub fn new(ports: StagePorts) -> Self {
        Self { ports }
    }

    /// Decomposes `objective`, with optional search context in the prompt.
    ///
    /// Fails only after the shared retry policy is exhausted or a permanent
    /// model error occurs.
    pub async fn decompose(
        &self,
        objective: &Objective,
        search: Option<&str>,
    ) -> Result<Vec<SubTask>, DecompositionError> {
        let config = &self.ports.config;
        let max_tasks = config.max_tasks;
        let request = CompletionRequest::new(
            config.models.orchestrator.clone(),
            DECOMPOSER_SYSTEM,
            decomposer_prompt(objective, max_tasks, search),
        )
        .with_max_tokens(config.models.max_tokens)
        .with_temperature(config.models.temperature);

        let retried = complete_parsed(&self.ports, LogStage::Decompose, &request, parse_tasks)
            .await
            .map_err(|failure| {
                self.ports.run_log.append(
                    StageRecord::new(LogStage::Decompose, "decompose.failed")
                        .error(&failure.error)
                        .data(json!({ "attempts": failure.attempts })),
                );
                DecompositionError::new(failure.error, failure.attempts)
            })?;

        let mut tasks = retried.value;
        if tasks.len() > max_tasks {
            warn!(
                proposed = tasks.len(),
                max_tasks, "Decomposer proposed too many sub-tasks; truncating"
            );
            self.ports.run_log.append(
                StageRecord::new(LogStage::Decompose, "decompose.truncated").data(json!({
                    "proposed": tasks.len(),
                    "kept": max_tasks,
                    "dropped": tasks[max_tasks..].iter().map(|t| &t.title).collect::<Vec<_>>(),
                })),
            );
            tasks.truncate(max_tasks);
        }

        info!(tasks = tasks.len(), attempts = retried.attempts, "Objective decomposed");
        self.ports.run_log.append(
            StageRecord::new(LogStage::Decompose, "decompose.completed")
                .output(
                    tasks
                        .iter()
                        .map(|t| t.title.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                )
                .data(json!({ "tasks": tasks, "attempts": retried.attempts })),
        );
        Ok(tasks)
    }
}
