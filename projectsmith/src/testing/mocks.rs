//! Scripted clients for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

use crate::errors::{LlmError, SearchError};
use crate::llm::{Completion, CompletionRequest, FinishReason, LlmClient};
use crate::websearch::{SearchClient, SearchHit};

type Scripted = Result<Completion, LlmError>;

struct Rule {
    needle: String,
    queue: VecDeque<Scripted>,
    sticky: Option<Scripted>,
}

/// A language-model client that answers from a script.
///
/// Each rule is keyed by a needle that must occur somewhere in the request's
/// messages. Rules are tried in registration order; a rule answers from its queue
/// first, then repeats its sticky answer, and is skipped once both are used up.
/// Requests no rule matches fail with [`LlmError::InvalidResponse`].
///
/// Routing by content keeps concurrent sub-task executions deterministic.
#[derive(Default)]
pub struct ScriptedLlmClient {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl fmt::Debug for ScriptedLlmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedLlmClient")
            .field("rules", &self.rules.lock().len())
            .field("call_count", &self.call_count())
            .finish()
    }
}

impl ScriptedLlmClient {
    /// Creates a client with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests containing `needle` with `responses`, in order.
    #[must_use]
    pub fn on<I>(self, needle: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = Scripted>,
    {
        self.rules.lock().push(Rule {
            needle: needle.into(),
            queue: responses.into_iter().collect(),
            sticky: None,
        });
        self
    }

    /// Answers every request containing `needle` with `response`.
    #[must_use]
    pub fn always(self, needle: impl Into<String>, response: Scripted) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.into(),
            queue: VecDeque::new(),
            sticky: Some(response),
        });
        self
    }

    /// Every request received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Requests whose messages contain `needle`.
    #[must_use]
    pub fn requests_matching(&self, needle: &str) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| request_text(r).contains(needle))
            .cloned()
            .collect()
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

fn request_text(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let text = request_text(&request);
        let model = request.model.clone();
        self.requests.lock().push(request);

        let mut rules = self.rules.lock();
        for rule in rules.iter_mut().filter(|r| text.contains(&r.needle)) {
            let answer = match rule.queue.pop_front() {
                Some(answer) => answer,
                None => match rule.sticky {
                    Some(ref answer) => answer.clone(),
                    None => continue,
                },
            };
            return answer.map(|mut completion| {
                if completion.model.is_empty() {
                    completion.model = model;
                }
                completion
            });
        }
        Err(LlmError::InvalidResponse(format!(
            "no scripted response for request: {}",
            crate::events::summarize(&text, 120)
        )))
    }
}

/// A completion that stopped naturally.
#[must_use]
pub fn reply(content: impl Into<String>) -> Scripted {
    Ok(Completion::text(content))
}

/// A completion cut off at the token cap.
#[must_use]
pub fn truncated_reply(content: impl Into<String>) -> Scripted {
    let mut completion = Completion::text(content);
    completion.finish_reason = Some(FinishReason::Length);
    Ok(completion)
}

/// A search client that always returns the same hits.
#[derive(Debug, Default)]
pub struct StaticSearchClient {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearchClient {
    /// Creates a client returning `hits`.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchClient for StaticSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.queries.lock().push(query.to_string());
        Ok(self.hits.clone())
    }
}

/// A search client whose every call fails.
#[derive(Debug, Default)]
pub struct FailingSearchClient;

#[async_trait]
impl SearchClient for FailingSearchClient {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::Transport("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_by_needle_and_drains_queue() {
        let client = ScriptedLlmClient::new()
            .on("alpha", [reply("a1"), reply("a2")])
            .always("beta", reply("b"));

        let ask = |text: &str| CompletionRequest::new("m", "sys", text);
        assert_eq!(client.complete(ask("alpha")).await.unwrap().content, "a1");
        assert_eq!(client.complete(ask("beta")).await.unwrap().content, "b");
        assert_eq!(client.complete(ask("alpha")).await.unwrap().content, "a2");
        assert!(client.complete(ask("alpha")).await.is_err());
        assert_eq!(client.complete(ask("beta")).await.unwrap().content, "b");
        assert_eq!(client.call_count(), 5);
        assert_eq!(client.requests_matching("alpha").len(), 3);
    }

    #[tokio::test]
    async fn test_fills_in_model_name() {
        let client = ScriptedLlmClient::new().always("x", reply("ok"));
        let completion = client
            .complete(CompletionRequest::new("gpt-test", "sys", "x"))
            .await
            .unwrap();
        assert_eq!(completion.model, "gpt-test");
    }

    #[tokio::test]
    async fn test_search_clients() {
        let client = StaticSearchClient::new(vec![SearchHit::new("t", "s", "u")]);
        assert_eq!(client.search("q").await.unwrap().len(), 1);
        assert_eq!(client.queries(), vec!["q".to_string()]);
        assert!(FailingSearchClient.search("q").await.is_err());
    }
}
