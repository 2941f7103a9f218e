//! The pipeline stages.
//!
//! Each stage is a plain struct built from [`StagePorts`]:
//! - [`Decomposer`] turns the objective into sub-tasks
//! - [`TaskExecutor`] generates and validates each sub-task's files
//! - [`Refiner`] merges the generations into one deliverable, with
//!   [`mechanical_merge`] as the fallback
//! - [`Materializer`] writes the deliverable and the run log

mod calls;
pub mod decomposer;
pub mod executor;
pub mod materializer;
mod ports;
pub mod prompts;
pub mod refiner;

pub use decomposer::{parse_tasks, Decomposer};
pub use executor::{ExecutionInput, TaskExecutor};
pub use materializer::{Materialized, Materializer, RunDirectory};
pub use ports::StagePorts;
pub use refiner::{mechanical_merge, parse_refined, resolve_collisions, Refiner, ResolvedEntry};

pub(crate) use calls::search_context;
