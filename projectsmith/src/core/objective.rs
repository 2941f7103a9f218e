//! The caller-supplied objective.

use serde::{Deserialize, Serialize};

/// Immutable input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// The free-text description of the desired project.
    pub text: String,
    /// Whether web-search augmentation is enabled for this run.
    #[serde(default)]
    pub use_search: bool,
    /// Optional content of a file the caller attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl Objective {
    /// Creates an objective without search or attachment.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            use_search: false,
            attachment: None,
        }
    }

    /// Enables or disables web-search augmentation.
    #[must_use]
    pub fn with_search(mut self, enabled: bool) -> Self {
        self.use_search = enabled;
        self
    }

    /// Attaches file content for the decomposer and the first sub-task.
    #[must_use]
    pub fn with_attachment(mut self, content: impl Into<String>) -> Self {
        self.attachment = Some(content.into());
        self
    }
}
