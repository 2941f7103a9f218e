//! Configuration for web-search augmentation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Search settings shared by the pipeline and the HTTP client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum hits requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Cap on the formatted context injected into a prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Provider search depth ("basic" or "advanced").
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    /// Ask the provider for a synthesized answer as well.
    #[serde(default = "default_include_answer")]
    pub include_answer: bool,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
}

fn default_max_results() -> usize {
    5
}

fn default_max_context_chars() -> usize {
    4_000
}

fn default_search_depth() -> String {
    "basic".to_string()
}

fn default_include_answer() -> bool {
    true
}

fn default_timeout() -> f64 {
    20.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_context_chars: default_max_context_chars(),
            search_depth: default_search_depth(),
            include_answer: default_include_answer(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl SearchConfig {
    /// Creates a new search configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result cap.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the context cap.
    #[must_use]
    pub fn with_max_context_chars(mut self, chars: usize) -> Self {
        self.max_context_chars = chars;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        crate::config::bounded_timeout(self.timeout_seconds, default_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: SearchConfig = toml::from_str("max_results = 3").unwrap();
        assert_eq!(config.max_results, 3);
        assert_eq!(config.max_context_chars, 4_000);
        assert_eq!(config.search_depth, "basic");
        assert_eq!(config.timeout(), Duration::from_secs(20));
    }
}
