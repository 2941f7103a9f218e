//! Web-search augmentation.
//!
//! This module provides:
//! - The [`SearchClient`] boundary and its [`SearchHit`] result type
//! - Search configuration
//! - Formatting hits into prompt context
//! - A Tavily client (with the `websearch` feature)

mod client;
mod config;
mod context;
#[cfg(feature = "websearch")]
mod tavily;

#[cfg(test)]
pub use client::MockSearchClient;
pub use client::{SearchClient, SearchHit};
pub use config::SearchConfig;
pub use context::format_search_context;
#[cfg(feature = "websearch")]
pub use tavily::TavilySearchClient;
