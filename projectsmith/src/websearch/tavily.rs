//! Tavily search client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::{SearchClient, SearchHit};
use super::config::SearchConfig;
use crate::errors::SearchError;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// HTTP client for the Tavily search API.
pub struct TavilySearchClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    config: SearchConfig,
}

impl TavilySearchClient {
    /// Creates a client.
    pub fn new(api_key: impl Into<String>, config: SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SearchError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: TAVILY_ENDPOINT.to_string(),
            config,
        })
    }

    /// Creates a client from `TAVILY_API_KEY`.
    pub fn from_env(config: SearchConfig) -> Result<Self, SearchError> {
        let key = std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SearchError::Configuration("TAVILY_API_KEY is not set".to_string()))?;
        Self::new(key, config)
    }

    /// Overrides the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn into_hits(response: TavilyResponse) -> Vec<SearchHit> {
    let mut hits = Vec::with_capacity(response.results.len() + 1);
    if let Some(answer) = response.answer.filter(|a| !a.trim().is_empty()) {
        hits.push(SearchHit::new("Answer", answer, ""));
    }
    hits.extend(
        response
            .results
            .into_iter()
            .map(|r| SearchHit::new(r.title, r.content, r.url)),
    );
    hits
}

#[async_trait]
impl SearchClient for TavilySearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| SearchError::Configuration(e.to_string()))?,
        );
        let body = TavilyRequest {
            query,
            max_results: self.config.max_results,
            search_depth: &self.config.search_depth,
            include_answer: self.config.include_answer,
        };
        debug!(query, "Sending search request");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SearchError::Provider {
                status: status.as_u16(),
                body: text.chars().take(1_000).collect(),
            });
        }

        let parsed: TavilyResponse =
            serde_json::from_str(&text).map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        Ok(into_hits(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_to_hits() {
        let body = r#"{
            "answer": "Use argparse.",
            "results": [
                {"title": "argparse docs", "url": "https://docs.python.org", "content": "Parser for CLI options", "score": 0.9}
            ]
        }"#;
        let parsed: TavilyResponse = serde_json::from_str(body).unwrap();
        let hits = into_hits(parsed);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "Use argparse.");
        assert_eq!(hits[1].url, "https://docs.python.org");
    }

    #[test]
    fn test_missing_answer_is_skipped() {
        let parsed: TavilyResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(into_hits(parsed).is_empty());
    }
}
