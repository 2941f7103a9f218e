//! The language-model client boundary.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{Completion, CompletionRequest};
use crate::errors::LlmError;

/// A language-model client.
///
/// Implementations must report transient failures with a retryable
/// [`LlmError`] variant so the shared retry policy can tell them apart.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        (**self).complete(request).await
    }
}

/// Runs one completion under a per-call timeout.
///
/// Elapsed timeouts become [`LlmError::Timeout`], which is retryable.
pub async fn complete_with_timeout(
    client: &dyn LlmClient,
    request: CompletionRequest,
    timeout: Duration,
) -> Result<Completion, LlmError> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, client.complete(request)).await {
        Ok(Ok(mut completion)) => {
            if completion.latency_ms.is_none() {
                completion.latency_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
            }
            Ok(completion)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(LlmError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
