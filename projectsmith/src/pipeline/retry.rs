//! Shared retry policy for every model-call stage.
//!
//! A bounded-attempt state machine with configurable backoff and jitter. Each
//! failure is classified through [`Retryable`]: non-retryable failures stop
//! immediately, retryable ones are retried until the attempt budget runs out.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies a failure as transient or permanent.
pub trait Retryable {
    /// Returns true if repeating the same operation may succeed.
    fn is_retryable(&self) -> bool;
}

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// A config that retries immediately, for tests and local runs.
    #[must_use]
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(0)
            .with_jitter(JitterStrategy::None)
    }
}

/// State tracking for retry operations.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: usize,
    /// Previous delays for decorrelated jitter.
    previous_delays: HashMap<String, u64>,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> usize {
        self.attempt += 1;
        self.attempt
    }

    /// Calculates the delay before the next attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, key: &str, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let step = self.attempt.saturating_sub(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(step).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
            BackoffStrategy::Linear => {
                let factor = u64::try_from(step + 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor).min(max)
            }
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delays.get(key).copied().unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                let new_delay = if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delays.insert(key.to_string(), new_delay);
                new_delay
            }
        };

        Duration::from_millis(jittered)
    }

    /// Returns true if the attempt budget is spent.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts left.
    GiveUp,
    /// The failure is permanent.
    NotRetryable,
}

/// Decides what to do after a failed attempt.
#[must_use]
pub fn should_retry(
    state: &mut RetryState,
    config: &RetryConfig,
    key: &str,
    retryable: bool,
) -> RetryDecision {
    if !retryable {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry(state.calculate_delay(key, config))
}

/// A value produced after one or more attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    /// The successful value.
    pub value: T,
    /// How many attempts it took (1-based).
    pub attempts: usize,
}

/// The final failure of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    /// The last error observed.
    pub error: E,
    /// How many attempts were made.
    pub attempts: usize,
    /// Why retrying stopped.
    pub decision: RetryDecision,
}

/// Executes an operation with retry logic.
///
/// The operation receives the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
) -> Result<Retried<T>, RetryFailure<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut state = RetryState::new();

    loop {
        let attempt = state.begin_attempt();
        match operation(attempt).await {
            Ok(value) => return Ok(Retried { value, attempts: attempt }),
            Err(e) => {
                match should_retry(&mut state, config, key, e.is_retryable()) {
                    RetryDecision::Retry(delay) => {
                        tracing::debug!(
                            key,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "Retrying after error"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    decision @ (RetryDecision::GiveUp | RetryDecision::NotRetryable) => {
                        tracing::warn!(key, attempt, error = %e, ?decision, "Giving up");
                        return Err(RetryFailure {
                            error: e,
                            attempts: attempt,
                            decision,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError {
        retryable: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable={})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30000);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(500)
            .with_max_delay_ms(10000)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_calculate_delay_exponential_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        state.attempt = 1;
        assert_eq!(state.calculate_delay("k", &config), Duration::from_millis(100));
        state.attempt = 2;
        assert_eq!(state.calculate_delay("k", &config), Duration::from_millis(200));
        state.attempt = 3;
        assert_eq!(state.calculate_delay("k", &config), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_linear_and_constant() {
        let linear = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);
        let constant = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();

        state.attempt = 3;
        assert_eq!(state.calculate_delay("k", &linear), Duration::from_millis(300));
        assert_eq!(state.calculate_delay("k", &constant), Duration::from_millis(100));
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(JitterStrategy::None);
        let mut state = RetryState::new();
        state.attempt = 11;
        assert_eq!(state.calculate_delay("k", &config), Duration::from_millis(5000));
    }

    #[test]
    fn test_full_jitter_stays_below_delay() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Full);
        let mut state = RetryState::new();
        state.attempt = 1;
        for _ in 0..10 {
            assert!(state.calculate_delay("k", &config) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_should_retry_decisions() {
        let config = RetryConfig::immediate(2);
        let mut state = RetryState::new();

        state.begin_attempt();
        assert!(matches!(
            should_retry(&mut state, &config, "k", true),
            RetryDecision::Retry(_)
        ));
        state.begin_attempt();
        assert_eq!(should_retry(&mut state, &config, "k", true), RetryDecision::GiveUp);
        assert_eq!(
            should_retry(&mut state, &config, "k", false),
            RetryDecision::NotRetryable
        );
    }

    #[tokio::test]
    async fn test_with_retry_success_first_try() {
        let config = RetryConfig::immediate(3);
        let result = with_retry(&config, "test", |_| async { Ok::<_, TestError>(42) }).await;
        assert_eq!(result, Ok(Retried { value: 42, attempts: 1 }));
    }

    #[tokio::test]
    async fn test_with_retry_success_after_failures() {
        let config = RetryConfig::immediate(5);
        let result = with_retry(&config, "test", |attempt| async move {
            if attempt < 3 {
                Err(TestError { retryable: true })
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(Retried { value: 3, attempts: 3 }));
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_exact_budget() {
        let config = RetryConfig::immediate(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<Retried<()>, _> = with_retry(&config, "test", |_| {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: true })
            }
        })
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.decision, RetryDecision::GiveUp);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_permanent_failure() {
        let config = RetryConfig::immediate(5);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<Retried<()>, _> = with_retry(&config, "test", |_| {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: false })
            }
        })
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.decision, RetryDecision::NotRetryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
