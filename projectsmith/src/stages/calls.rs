//! Model and search calls shared by the stages.

use serde_json::json;
use tracing::warn;

use super::ports::StagePorts;
use crate::errors::{LlmError, StageCallError};
use crate::events::{LogStage, StageRecord};
use crate::llm::{complete_with_timeout, Completion, CompletionRequest};
use crate::pipeline::retry::{with_retry, Retried, RetryFailure};
use crate::websearch::format_search_context;

/// One model call under the shared retry policy and per-call timeout.
///
/// Every attempt and every failure is recorded in the run log.
pub(crate) async fn complete_logged(
    ports: &StagePorts,
    stage: LogStage,
    task_id: Option<usize>,
    request: &CompletionRequest,
) -> Result<Retried<Completion>, RetryFailure<LlmError>> {
    let parse = |completion: Completion| Ok::<_, LlmError>(completion);
    call_with(ports, stage, task_id, request, parse).await
}

/// A model call whose answer must also parse; malformed answers are retried.
pub(crate) async fn complete_parsed<T, P>(
    ports: &StagePorts,
    stage: LogStage,
    request: &CompletionRequest,
    parse: P,
) -> Result<Retried<T>, RetryFailure<StageCallError>>
where
    P: Fn(&str) -> Result<T, StageCallError>,
{
    let parse = |completion: Completion| parse(&completion.content);
    call_with(ports, stage, None, request, parse).await
}

async fn call_with<T, E, P>(
    ports: &StagePorts,
    stage: LogStage,
    task_id: Option<usize>,
    request: &CompletionRequest,
    parse: P,
) -> Result<Retried<T>, RetryFailure<E>>
where
    P: Fn(Completion) -> Result<T, E>,
    E: From<LlmError> + crate::pipeline::retry::Retryable + std::fmt::Display,
{
    let timeout = ports.config.call_timeout();
    let key = match task_id {
        Some(id) => format!("{stage}.{id}"),
        None => stage.to_string(),
    };
    let parse = &parse;

    with_retry(&ports.config.retry, &key, move |attempt| async move {
        let mut record = StageRecord::new(stage, format!("{stage}.call"))
            .input(request.user_text())
            .data(json!({ "attempt": attempt, "model": request.model }));
        if let Some(id) = task_id {
            record = record.task(id);
        }
        ports.run_log.append(record);

        let outcome = match complete_with_timeout(ports.llm.as_ref(), request.clone(), timeout).await {
            Ok(completion) => {
                let attributes = completion.to_log_attributes();
                let output = completion.content.clone();
                parse(completion).map(|value| (value, output, attributes))
            }
            Err(e) => Err(E::from(e)),
        };

        match outcome {
            Ok((value, output, attributes)) => {
                let mut record = StageRecord::new(stage, format!("{stage}.response"))
                    .output(&output)
                    .data(json!({ "attempt": attempt, "llm": attributes }));
                if let Some(id) = task_id {
                    record = record.task(id);
                }
                ports.run_log.append(record);
                Ok(value)
            }
            Err(e) => {
                let mut record = StageRecord::new(stage, format!("{stage}.call_failed"))
                    .error(&e)
                    .data(json!({ "attempt": attempt }));
                if let Some(id) = task_id {
                    record = record.task(id);
                }
                ports.run_log.append(record);
                Err(e)
            }
        }
    })
    .await
}

/// Runs one search and formats the hits for a prompt.
///
/// Returns `None` when search is unavailable, fails, or finds nothing; failures
/// are logged and otherwise ignored.
pub(crate) async fn search_context(
    ports: &StagePorts,
    query: &str,
    task_id: Option<usize>,
) -> Option<String> {
    let client = ports.search.as_ref()?;
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    let with_task = |record: StageRecord| match task_id {
        Some(id) => record.task(id),
        None => record,
    };

    match client.search(query).await {
        Ok(hits) => {
            let context =
                format_search_context(query, &hits, ports.config.search.max_context_chars);
            ports.run_log.append(with_task(
                StageRecord::new(LogStage::Search, "search.completed")
                    .input(query)
                    .output(context.as_deref().unwrap_or_default())
                    .data(json!({ "hits": hits.len() })),
            ));
            context
        }
        Err(e) => {
            warn!(query, error = %e, "Search failed; continuing without augmentation");
            ports.run_log.append(with_task(
                StageRecord::new(LogStage::Search, "search.failed")
                    .input(query)
                    .error(&e),
            ));
            None
        }
    }
}
