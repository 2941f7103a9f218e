//! The web-search client boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::SearchError;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page title.
    pub title: String,
    /// Relevant excerpt.
    pub snippet: String,
    /// Source URL.
    #[serde(default)]
    pub url: String,
}

impl SearchHit {
    /// Creates a hit.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
        }
    }
}

/// A web-search provider.
///
/// Failures never abort a run; callers log them and continue without
/// augmentation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Runs one query.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}

#[async_trait]
impl SearchClient for Arc<dyn SearchClient> {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        (**self).search(query).await
    }
}
