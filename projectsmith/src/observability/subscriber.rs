//! `tracing-subscriber` initialisation.

use tracing_subscriber::EnvFilter;

/// Console log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

fn filter(fallback_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. `RUST_LOG` wins over `fallback_level`.
///
/// Returns false if a subscriber was already installed.
pub fn init_tracing(format: LogFormat, fallback_level: &str) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(fallback_level))
        .with_target(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
