//! Bounded retry loop for overloaded language models
//!
//! States: `Attempting` → (`Waiting` → `Attempting`)* → `Succeeded` | `Failed`.
//! Only overload failures move to `Waiting`; the delay before attempt n+1 is
//! `base_delay * 2^n + jitter`, jitter uniform in `[0, max_jitter)`.

use rand::Rng;
use std::time::{Duration, Instant};

use crate::config::RetryConfig;
use crate::errors::{AppError, Result};
use crate::llm::LanguageModel;
use crate::metrics;

/// Source of the random part of the backoff delay
pub trait JitterSource: Send + Sync {
    /// A duration in `[0, max)`; zero when `max` is zero.
    fn jitter(&self, max: Duration) -> Duration;
}

/// Uniform jitter from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// Always zero; makes backoff deterministic
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn jitter(&self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// How many times to call the provider and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn backoff_delay(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).saturating_add(jitter)
    }
}

/// Result of the retry loop and the number of provider calls it made
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<String>,
    pub attempts: u32,
}

enum RetryState {
    Attempting,
    Waiting,
    Succeeded(String),
    Failed(AppError),
}

/// Call `model` until it answers, fails for good, or attempts run out.
pub async fn generate_with_retry(
    model: &dyn LanguageModel,
    prompt: &str,
    policy: &RetryPolicy,
    jitter: &dyn JitterSource,
) -> RetryOutcome {
    let mut attempt: u32 = 0;
    let mut state = RetryState::Attempting;

    loop {
        state = match state {
            RetryState::Attempting => {
                let start = Instant::now();
                let result = model.generate(prompt).await;
                let elapsed = start.elapsed().as_secs_f64();

                match result {
                    Ok(text) => {
                        metrics::record_provider_attempt(model.model_name(), "success", elapsed);
                        RetryState::Succeeded(text)
                    }
                    Err(e) if e.is_overloaded() && attempt + 1 < policy.max_attempts => {
                        metrics::record_provider_attempt(model.model_name(), "overloaded", elapsed);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts = policy.max_attempts,
                            error = %e,
                            "Language model overloaded, retrying"
                        );
                        RetryState::Waiting
                    }
                    Err(e) if e.is_overloaded() => {
                        metrics::record_provider_attempt(model.model_name(), "overloaded", elapsed);
                        RetryState::Failed(AppError::RetriesExhausted {
                            attempts: attempt + 1,
                            last_error: e.to_string(),
                        })
                    }
                    Err(e) => {
                        metrics::record_provider_attempt(model.model_name(), "error", elapsed);
                        RetryState::Failed(e)
                    }
                }
            }
            RetryState::Waiting => {
                let delay = policy.backoff_delay(attempt, jitter.jitter(policy.max_jitter));
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
                RetryState::Attempting
            }
            RetryState::Succeeded(text) => {
                return RetryOutcome {
                    result: Ok(text),
                    attempts: attempt + 1,
                };
            }
            RetryState::Failed(err) => {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt + 1,
                };
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Scripted, ScriptedModel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0, Duration::ZERO), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1, Duration::ZERO), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3, Duration::from_millis(250)), Duration::from_millis(8250));
    }

    #[test]
    fn test_random_jitter_bounds() {
        let max = Duration::from_millis(1000);
        for _ in 0..200 {
            assert!(RandomJitter.jitter(max) < max);
        }
        assert_eq!(RandomJitter.jitter(Duration::ZERO), Duration::ZERO);
        assert_eq!(NoJitter.jitter(max), Duration::ZERO);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_jitter, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_succeeds_on_fifth_attempt() {
        let model = ScriptedModel::new([
            Scripted::Overloaded,
            Scripted::Overloaded,
            Scripted::Overloaded,
            Scripted::Overloaded,
            Scripted::Reply("finally".into()),
        ]);
        let outcome = generate_with_retry(&model, "q", &fast_policy(), &NoJitter).await;
        assert_eq!(assert_ok!(outcome.result), "finally");
        assert_eq!(outcome.attempts, 5);
        assert_eq!(model.calls(), 5);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let model = ScriptedModel::new(std::iter::repeat(Scripted::Overloaded).take(10));
        let outcome = generate_with_retry(&model, "q", &fast_policy(), &NoJitter).await;
        let err = assert_err!(outcome.result);
        assert!(matches!(err, AppError::RetriesExhausted { attempts: 5, .. }));
        assert_eq!(model.calls(), 5);
    }

    #[tokio::test]
    async fn test_non_overload_failure_is_not_retried() {
        let model = ScriptedModel::new([Scripted::Fail(400), Scripted::Reply("never".into())]);
        let outcome = generate_with_retry(&model, "q", &fast_policy(), &NoJitter).await;
        assert!(matches!(outcome.result, Err(AppError::Provider { status: Some(400), .. })));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let policy = RetryPolicy { max_attempts: 1, ..fast_policy() };
        let model = ScriptedModel::new([Scripted::Overloaded, Scripted::Reply("late".into())]);
        let outcome = generate_with_retry(&model, "q", &policy, &NoJitter).await;
        assert!(outcome.result.is_err());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_waits_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            max_jitter: Duration::ZERO,
        };
        let model = ScriptedModel::new([
            Scripted::Overloaded,
            Scripted::Overloaded,
            Scripted::Reply("ok".into()),
        ]);
        let start = Instant::now();
        let outcome = generate_with_retry(&model, "q", &policy, &NoJitter).await;
        assert!(outcome.result.is_ok());
        // 20ms + 40ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    /// Counts draws; the jitter itself is zero.
    struct CountingJitter {
        draws: AtomicUsize,
    }

    impl JitterSource for CountingJitter {
        fn jitter(&self, _max: Duration) -> Duration {
            self.draws.fetch_add(1, Ordering::SeqCst);
            Duration::ZERO
        }
    }

    #[tokio::test]
    async fn test_jitter_drawn_once_per_wait() {
        let jitter = CountingJitter {
            draws: AtomicUsize::new(0),
        };
        let model = ScriptedModel::new(std::iter::repeat(Scripted::Overloaded).take(10));
        let outcome = generate_with_retry(&model, "q", &fast_policy(), &jitter).await;

        assert_eq!(outcome.attempts, 5);
        assert_eq!(jitter.draws.load(Ordering::SeqCst), 4);

        let jitter = CountingJitter {
            draws: AtomicUsize::new(0),
        };
        let model = ScriptedModel::replying("first try");
        let outcome = generate_with_retry(&model, "q", &fast_policy(), &jitter).await;
        assert_eq!(assert_ok!(outcome.result), "first try");
        assert_eq!(jitter.draws.load(Ordering::SeqCst), 0);
    }
}
