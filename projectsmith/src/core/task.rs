//! Decomposed sub-tasks.

use serde::{Deserialize, Serialize};

/// One unit of work produced by the decomposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Sequence position, stable across the run (0-based).
    pub id: usize,
    /// Short title.
    pub title: String,
    /// What the executor should produce.
    pub description: String,
    /// Suggested output file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    /// Suggested language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// A focused web query that would help with this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

impl SubTask {
    /// Creates a sub-task with no path, language or query hints.
    #[must_use]
    pub fn new(id: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            target_path: None,
            language: None,
            search_query: None,
        }
    }

    /// Sets the target path.
    #[must_use]
    pub fn with_target_path(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    /// Sets the language hint.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the search query.
    #[must_use]
    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }
}
