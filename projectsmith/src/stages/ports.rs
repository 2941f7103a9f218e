//! Capabilities injected into every stage.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::events::RunLog;
use crate::llm::LlmClient;
use crate::validators::ValidatorRegistry;
use crate::websearch::SearchClient;

/// Shared handles a stage needs for one run.
///
/// Cloning is cheap: every field is reference counted.
#[derive(Clone)]
pub struct StagePorts {
    /// Language-model client.
    pub llm: Arc<dyn LlmClient>,
    /// Web-search client, if search augmentation is available.
    pub search: Option<Arc<dyn SearchClient>>,
    /// Validators for generated entries.
    pub validators: Arc<ValidatorRegistry>,
    /// The run's log.
    pub run_log: Arc<RunLog>,
    /// Pipeline settings.
    pub config: Arc<PipelineConfig>,
}

impl std::fmt::Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts")
            .field("has_search", &self.search.is_some())
            .field("validators", &self.validators)
            .field("run_id", &self.run_log.run_id())
            .finish_non_exhaustive()
    }
}

impl StagePorts {
    /// Creates ports without search.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        validators: Arc<ValidatorRegistry>,
        run_log: Arc<RunLog>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            llm,
            search: None,
            validators,
            run_log,
            config,
        }
    }

    /// Sets the search client.
    #[must_use]
    pub fn with_search(mut self, search: Option<Arc<dyn SearchClient>>) -> Self {
        self.search = search;
        self
    }

    /// Returns true if a search client is configured.
    #[must_use]
    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }
}
