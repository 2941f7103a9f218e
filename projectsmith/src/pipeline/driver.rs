//! The pipeline driver: decompose, execute, refine, materialize.

use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use super::context::RunContext;
use crate::config::PipelineConfig;
use crate::core::{Degradation, Objective, RunResult, RunState};
use crate::errors::{ConfigError, PipelineError};
use crate::events::{LogStage, RunLog, StageRecord};
use crate::llm::LlmClient;
use crate::observability::SpanTimer;
use crate::stages::{
    mechanical_merge, search_context, Decomposer, Materializer, Refiner, StagePorts, TaskExecutor,
};
use crate::utils::generate_run_id;
use crate::validators::ValidatorRegistry;
use crate::websearch::SearchClient;

/// A run that ended in [`RunState::Failed`].
///
/// Carries the run log so callers can still inspect what happened.
#[derive(Debug, Error)]
#[error("run failed while {state}: {error}")]
pub struct RunFailure {
    /// The fatal error.
    #[source]
    pub error: PipelineError,
    /// The state the run was in when it failed.
    pub state: RunState,
    /// Every run log record, in sequence order.
    pub records: Vec<StageRecord>,
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn SearchClient>>,
    validators: ValidatorRegistry,
    config: PipelineConfig,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("has_search", &self.search.is_some())
            .field("validators", &self.validators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Starts a builder with default validators and configuration.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            search: None,
            validators: ValidatorRegistry::with_defaults(),
            config: PipelineConfig::default(),
        }
    }

    /// Sets the search client.
    #[must_use]
    pub fn with_search(mut self, search: Option<Arc<dyn SearchClient>>) -> Self {
        self.search = search;
        self
    }

    /// Replaces the validator registry.
    #[must_use]
    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and builds the pipeline.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        self.config.validate()?;
        Ok(Pipeline {
            llm: self.llm,
            search: self.search,
            validators: Arc::new(self.validators),
            config: Arc::new(self.config),
        })
    }
}

/// A configured pipeline. Each [`Pipeline::run`] is an independent run.
#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn SearchClient>>,
    validators: Arc<ValidatorRegistry>,
    config: Arc<PipelineConfig>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("has_search", &self.search.is_some())
            .field("validators", &self.validators)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Starts a builder.
    #[must_use]
    pub fn builder(llm: Arc<dyn LlmClient>) -> PipelineBuilder {
        PipelineBuilder::new(llm)
    }

    /// The pipeline's configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline for one objective.
    ///
    /// Only decomposition and materialization failures are fatal. Failed
    /// sub-tasks and a failed refinement produce a degraded [`RunResult`].
    pub async fn run(&self, objective: Objective) -> Result<RunResult, RunFailure> {
        let run_log = Arc::new(RunLog::new(generate_run_id()));
        let span = info_span!("run", run_id = %run_log.run_id());
        self.drive(RunContext::new(objective, run_log)).instrument(span).await
    }

    async fn drive(&self, mut ctx: RunContext) -> Result<RunResult, RunFailure> {
        let run_timer = SpanTimer::start("run");
        let ports = StagePorts::new(
            self.llm.clone(),
            self.validators.clone(),
            ctx.run_log.clone(),
            self.config.clone(),
        )
        .with_search(self.search.clone());

        // Decomposing
        if ctx.objective.use_search {
            if ports.has_search() {
                ctx.search_context = search_context(&ports, &ctx.objective.text, None).await;
            } else {
                warn!("Search requested but no search client is configured");
                ctx.run_log.append(
                    StageRecord::new(LogStage::Search, "search.unavailable")
                        .error("no search client configured"),
                );
            }
        }

        let timer = SpanTimer::start("decompose");
        let decomposed = Decomposer::new(ports.clone())
            .decompose(&ctx.objective, ctx.search_context.as_deref())
            .await;
        timer.finish();
        ctx.subtasks = match decomposed {
            Ok(subtasks) => subtasks,
            Err(e) => return Err(Self::fail(&mut ctx, e.into())),
        };
        ctx.transition(RunState::Executing);

        // Executing
        let timer = SpanTimer::start("execute");
        ctx.results = TaskExecutor::new(ports.clone())
            .execute_all(&ctx.objective, &ctx.subtasks, ctx.search_context.as_deref())
            .await;
        timer.finish();
        ctx.degrade_failed_results();
        ctx.transition(RunState::Refining);

        // Refining
        let timer = SpanTimer::start("refine");
        let refined = match Refiner::new(ports.clone())
            .refine(&ctx.objective, &ctx.subtasks, &ctx.results)
            .await
        {
            Ok(refined) => refined,
            Err(e) => {
                let reason = e.to_string();
                ctx.degrade(Degradation::MechanicalMerge {
                    reason: reason.clone(),
                });
                mechanical_merge(&ctx.objective, &ctx.subtasks, &ctx.results, &reason)
            }
        };
        timer.finish();
        ctx.transition(RunState::Materializing);

        // Materializing
        let materializer = Materializer::new(&self.config.output_dir, ctx.run_log.clone());
        let materialized = match materializer.materialize(&refined, &ctx.objective.text).await {
            Ok(materialized) => materialized,
            Err(e) => return Err(Self::fail(&mut ctx, e.into())),
        };
        ctx.transition(RunState::Done);
        ctx.run_log.append(
            StageRecord::new(LogStage::Driver, "driver.completed").data(json!({
                "files": materialized.created_files.len(),
                "degraded": ctx.is_degraded(),
                "duration_ms": run_timer.elapsed_ms(),
            })),
        );
        if let Err(e) = materializer
            .rewrite_log(&materialized, &ctx.objective.text, &refined.project_name)
            .await
        {
            warn!(error = %e, "Could not record run completion in the log file");
        }

        info!(
            project = %refined.project_name,
            files = materialized.created_files.len(),
            degraded = ctx.is_degraded(),
            "Run completed"
        );
        run_timer.finish();

        Ok(RunResult {
            refined_output: refined.narrative,
            created_files: materialized.created_files,
            log_file: materialized.log_file,
            run_dir: materialized.run_dir,
            project_name: refined.project_name,
            state: ctx.state(),
            degraded: ctx.is_degraded(),
            degradations: ctx.degradations,
        })
    }

    fn fail(ctx: &mut RunContext, error: PipelineError) -> RunFailure {
        let state = ctx.state();
        error!(%state, code = error.code(), error = %error, "Run failed");
        ctx.run_log.append(
            StageRecord::new(LogStage::Driver, "driver.failed")
                .error(&error)
                .data(json!({ "code": error.code(), "state": state })),
        );
        ctx.transition(RunState::Failed);
        RunFailure {
            error,
            state,
            records: ctx.run_log.records(),
        }
    }
}
