//! Language-model client boundary.
//!
//! Stages talk to models only through [`LlmClient`]. The HTTP implementation
//! ([`OpenAiClient`]) is available with the `http` feature; tests use the
//! scripted client in [`crate::testing`].

mod client;
#[cfg(feature = "http")]
mod openai;
mod types;

pub use client::{complete_with_timeout, LlmClient};
#[cfg(feature = "http")]
pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{ChatMessage, Completion, CompletionRequest, FinishReason, Role, TokenUsage};
