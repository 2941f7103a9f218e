//! Pipeline configuration.
//!
//! Sources, lowest to highest precedence: defaults, a TOML file, environment
//! variables, then whatever the caller sets through the `with_*` builders.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::retry::RetryConfig;
use crate::websearch::SearchConfig;

/// Environment variable overriding [`PipelineConfig::output_dir`].
pub const ENV_OUTPUT_DIR: &str = "PROJECTSMITH_OUTPUT_DIR";
/// Environment variable overriding [`PipelineConfig::max_tasks`].
pub const ENV_MAX_TASKS: &str = "PROJECTSMITH_MAX_TASKS";
/// Environment variable overriding every model name.
pub const ENV_MODEL: &str = "PROJECTSMITH_MODEL";
/// Environment variable overriding [`PipelineConfig::max_concurrent_tasks`].
pub const ENV_CONCURRENCY: &str = "PROJECTSMITH_CONCURRENCY";

/// Upper bound for any timeout setting, in seconds (one day).
pub const MAX_TIMEOUT_SECONDS: f64 = 86_400.0;

/// Converts a timeout setting to a `Duration`, clamped to `[0.001, MAX_TIMEOUT_SECONDS]`.
///
/// Values that cannot be represented (NaN) fall back to `fallback` seconds.
pub(crate) fn bounded_timeout(seconds: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.clamp(0.001, MAX_TIMEOUT_SECONDS))
        .unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

fn timeout_in_range(seconds: f64) -> bool {
    seconds.is_finite() && seconds > 0.0 && seconds <= MAX_TIMEOUT_SECONDS
}

/// Model selection per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used by the decomposer.
    #[serde(default = "default_model")]
    pub orchestrator: String,
    /// Model used by the task executor.
    #[serde(default = "default_model")]
    pub executor: String,
    /// Model used by the refiner.
    #[serde(default = "default_model")]
    pub refiner: String,
    /// Sampling temperature for every call.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Token cap for every call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            orchestrator: default_model(),
            executor: default_model(),
            refiner: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl ModelConfig {
    /// Uses one model for every stage.
    #[must_use]
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            orchestrator: model.clone(),
            executor: model.clone(),
            refiner: model,
            ..Self::default()
        }
    }
}

/// Configuration for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model selection.
    #[serde(default)]
    pub models: ModelConfig,
    /// Upper bound on decomposed sub-tasks.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    /// Generation attempts per sub-task when validation fails.
    #[serde(default = "default_validation_attempts")]
    pub validation_attempts: usize,
    /// Sub-tasks executed at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Follow-up requests for a length-truncated generation.
    #[serde(default = "default_max_continuations")]
    pub max_continuations: usize,
    /// Per-call model timeout in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: f64,
    /// Retry policy shared by every model call.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Parent of every run directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Web-search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_max_tasks() -> usize {
    8
}

fn default_validation_attempts() -> usize {
    3
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_max_continuations() -> usize {
    1
}

fn default_call_timeout() -> f64 {
    120.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            models: ModelConfig::default(),
            max_tasks: default_max_tasks(),
            validation_attempts: default_validation_attempts(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_continuations: default_max_continuations(),
            call_timeout_seconds: default_call_timeout(),
            retry: RetryConfig::default(),
            output_dir: default_output_dir(),
            search: SearchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults, then the optional file, then the environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PROJECTSMITH_*` environment overrides.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir.trim());
        }
        if let Some(model) = get(ENV_MODEL) {
            let ModelConfig {
                temperature,
                max_tokens,
                ..
            } = self.models;
            self.models = ModelConfig {
                temperature,
                max_tokens,
                ..ModelConfig::uniform(model.trim())
            };
        }
        if let Some(value) = get(ENV_MAX_TASKS) {
            self.max_tasks = parse_count(ENV_MAX_TASKS, &value)?;
        }
        if let Some(value) = get(ENV_CONCURRENCY) {
            self.max_concurrent_tasks = parse_count(ENV_CONCURRENCY, &value)?;
        }
        Ok(self)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == 0 {
            return Err(ConfigError::Invalid("max_tasks must be at least 1".into()));
        }
        if self.validation_attempts == 0 {
            return Err(ConfigError::Invalid(
                "validation_attempts must be at least 1".into(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !timeout_in_range(self.call_timeout_seconds) {
            return Err(ConfigError::Invalid(format!(
                "call_timeout_seconds must be positive and at most {MAX_TIMEOUT_SECONDS}"
            )));
        }
        if !timeout_in_range(self.search.timeout_seconds) {
            return Err(ConfigError::Invalid(format!(
                "search.timeout_seconds must be positive and at most {MAX_TIMEOUT_SECONDS}"
            )));
        }
        if self.models.max_tokens == 0 {
            return Err(ConfigError::Invalid("models.max_tokens must be at least 1".into()));
        }
        Ok(())
    }

    /// Per-call model timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        bounded_timeout(self.call_timeout_seconds, default_call_timeout())
    }

    /// Sets the model selection.
    #[must_use]
    pub fn with_models(mut self, models: ModelConfig) -> Self {
        self.models = models;
        self
    }

    /// Sets the sub-task cap.
    #[must_use]
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Sets the validation attempt budget.
    #[must_use]
    pub fn with_validation_attempts(mut self, attempts: usize) -> Self {
        self.validation_attempts = attempts;
        self
    }

    /// Sets sub-task concurrency.
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    /// Sets the continuation budget.
    #[must_use]
    pub fn with_max_continuations(mut self, n: usize) -> Self {
        self.max_continuations = n;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout_seconds(mut self, seconds: f64) -> Self {
        self.call_timeout_seconds = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the search settings.
    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_tasks, 8);
        assert_eq!(config.validation_attempts, 3);
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            max_tasks = 5
            output_dir = "/tmp/out"

            [models]
            executor = "gpt-4o"

            [retry]
            max_attempts = 2
            backoff_strategy = "linear"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_tasks, 5);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.models.executor, "gpt-4o");
        assert_eq!(config.models.orchestrator, "gpt-4o-mini");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.validation_attempts, 3);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PipelineConfig::from_toml_str("max_tasks = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_OUTPUT_DIR, "runs"),
            (ENV_MAX_TASKS, "3"),
            (ENV_MODEL, "local-model"),
            (ENV_CONCURRENCY, "2"),
        ]
        .into_iter()
        .collect();
        let config = PipelineConfig::default()
            .apply_overrides_with(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("runs"));
        assert_eq!(config.max_tasks, 3);
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.models.refiner, "local-model");
        assert_eq!(config.models.max_tokens, 4096);
    }

    #[test]
    fn test_bad_env_value() {
        let err = PipelineConfig::default()
            .apply_overrides_with(|k| (k == ENV_MAX_TASKS).then(|| "zero".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        assert!(PipelineConfig::default().with_max_tasks(0).validate().is_err());
        assert!(PipelineConfig::default()
            .with_validation_attempts(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_max_concurrent_tasks(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_call_timeout_seconds(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_huge_timeouts_are_rejected_and_never_panic() {
        let config = PipelineConfig::default().with_call_timeout_seconds(1e20);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.call_timeout(), Duration::from_secs(86_400));

        let nan = PipelineConfig::default().with_call_timeout_seconds(f64::NAN);
        assert!(nan.validate().is_err());
        assert_eq!(
            nan.call_timeout(),
            Duration::from_secs_f64(default_call_timeout())
        );

        let search = SearchConfig {
            timeout_seconds: 1e20,
            ..SearchConfig::default()
        };
        assert_eq!(search.timeout(), Duration::from_secs(86_400));
        assert!(PipelineConfig::default()
            .with_search(search)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_call_timeout_seconds(MAX_TIMEOUT_SECONDS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projectsmith.toml");
        std::fs::write(&path, "max_concurrent_tasks = 1\n").unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_tasks, 1);

        let missing = PipelineConfig::from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
