//! Fixtures for stage and pipeline tests.

use std::path::Path;
use std::sync::Arc;

use super::mocks::ScriptedLlmClient;
use crate::config::PipelineConfig;
use crate::events::RunLog;
use crate::pipeline::retry::RetryConfig;
use crate::stages::StagePorts;
use crate::utils::generate_run_id;
use crate::validators::ValidatorRegistry;
use crate::websearch::SearchClient;

/// A configuration suited to tests: immediate retries, short timeouts.
#[must_use]
pub fn test_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig::new()
        .with_retry(RetryConfig::immediate(3))
        .with_call_timeout_seconds(5.0)
        .with_output_dir(output_dir)
}

/// Everything a single stage needs, wired to a scripted model.
#[derive(Debug)]
pub struct StageFixture {
    /// The scripted model.
    pub llm: Arc<ScriptedLlmClient>,
    /// The ports handed to the stage.
    pub ports: StagePorts,
}

impl StageFixture {
    /// Wires `llm` with the default validators and `config`.
    #[must_use]
    pub fn new(llm: ScriptedLlmClient, config: PipelineConfig) -> Self {
        let llm = Arc::new(llm);
        let ports = StagePorts::new(
            llm.clone(),
            Arc::new(ValidatorRegistry::with_defaults()),
            Arc::new(RunLog::new(generate_run_id())),
            Arc::new(config),
        );
        Self { llm, ports }
    }

    /// Adds a search client.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn SearchClient>) -> Self {
        self.ports = self.ports.with_search(Some(search));
        self
    }

    /// The run log shared with the stage.
    #[must_use]
    pub fn run_log(&self) -> &RunLog {
        &self.ports.run_log
    }

    /// Event names recorded so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.ports
            .run_log
            .records()
            .into_iter()
            .map(|r| r.event)
            .collect()
    }
}
