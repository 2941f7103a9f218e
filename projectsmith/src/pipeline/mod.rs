//! Pipeline driving and the shared retry policy.
//!
//! This module provides:
//! - The [`Pipeline`] driver and its builder
//! - The per-run [`RunContext`] state machine
//! - The bounded-attempt retry policy used by every model call

mod context;
mod driver;
#[cfg(test)]
mod integration_tests;
pub mod retry;

pub use context::RunContext;
pub use driver::{Pipeline, PipelineBuilder, RunFailure};
pub use retry::{
    should_retry, with_retry, BackoffStrategy, JitterStrategy, Retried, RetryConfig,
    RetryDecision, RetryFailure, RetryState, Retryable,
};
