//! Testing utilities for projectsmith pipelines.
//!
//! This module provides:
//! - A scripted language-model client and fixed search clients
//! - Stage fixtures wired to those clients
//! - Assertions over run logs and generation results

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_generation, assert_logged, assert_logged_times};
pub use fixtures::{test_config, StageFixture};
pub use mocks::{
    reply, truncated_reply, FailingSearchClient, ScriptedLlmClient, StaticSearchClient,
};
