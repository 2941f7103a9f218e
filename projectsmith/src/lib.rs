//! # Projectsmith
//!
//! Turns a free-text objective into a generated multi-file project.
//!
//! A run moves through four stages:
//!
//! - **Decompose**: one model call splits the objective into ordered sub-tasks
//! - **Execute**: each sub-task is generated and checked by syntax validators,
//!   retrying with diagnostics up to a bounded number of attempts
//! - **Refine**: one model call merges the generations into a final file set
//!   and a narrative, with a mechanical merge as fallback
//! - **Materialize**: files are written under a fresh run directory next to a
//!   structured JSON run log
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use projectsmith::prelude::*;
//! use std::sync::Arc;
//!
//! let llm = Arc::new(OpenAiClient::from_env()?);
//! let pipeline = Pipeline::builder(llm)
//!     .with_config(PipelineConfig::new().with_output_dir("generated"))
//!     .build()?;
//!
//! let result = pipeline.run(Objective::new("Build a CLI calculator")).await?;
//! println!("{}", result.refined_output);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod llm;
pub mod observability;
pub mod parsing;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;
pub mod validators;
pub mod websearch;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::core::{
        Degradation, FileEntry, GenerationResult, Objective, RefinedOutput, RunResult, RunState,
        SubTask, ValidationStatus,
    };
    pub use crate::errors::{
        ConfigError, DecompositionError, LlmError, MaterializeError, PipelineError,
        RefinementError,
    };
    pub use crate::events::{RunLog, StageRecord};
    #[cfg(feature = "http")]
    pub use crate::llm::OpenAiClient;
    pub use crate::llm::{Completion, CompletionRequest, LlmClient};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{Pipeline, PipelineBuilder, RetryConfig, RunFailure};
    pub use crate::validators::{ValidationOutcome, ValidatorRegistry};
    #[cfg(feature = "websearch")]
    pub use crate::websearch::TavilySearchClient;
    pub use crate::websearch::{SearchClient, SearchHit};
}
