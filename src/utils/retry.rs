//! Retry utilities for transport failures
//!
//! Exponential backoff with random jitter, driven by a caller-supplied
//! predicate so that only transient failures are retried. Every backoff sleep
//! observes the crawl's [`CancelToken`].

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::cancel::{CancelToken, Cancelled};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Fraction of the computed delay added as random jitter (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a retry configuration with custom delays
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            ..Default::default()
        }
    }

    /// Disable jitter, mostly for deterministic tests
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Backoff before `attempt` without jitter
    fn base_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential =
                self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
            (exponential as u64).min(self.max_delay_ms)
        };

        Duration::from_millis(delay_ms)
    }

    /// Backoff before `attempt` including jitter, never above `max_delay_ms`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() || self.jitter <= 0.0 {
            return base;
        }

        let spread = (base.as_millis() as f64 * self.jitter.min(1.0)) as u64;
        let extra = rand::thread_rng().gen_range(0..=spread);
        Duration::from_millis((base.as_millis() as u64 + extra).min(self.max_delay_ms))
    }
}

/// Outcome of a retried operation that may also have been cancelled
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed (non-retryable or retries exhausted)
    Failed(E),
    /// The cancellation signal fired during an attempt or a backoff sleep
    Cancelled,
}

impl<E> From<Cancelled> for RetryError<E> {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Execute an operation with retry logic, using a custom retry predicate
///
/// Errors for which `should_retry` returns `false` are returned immediately.
/// Retryable errors are attempted up to `config.max_retries` additional times
/// with jittered exponential backoff; the last error is returned afterwards.
///
/// # Example
///
/// ```no_run
/// use rednote::utils::cancel::CancelToken;
/// use rednote::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn run() {
/// let config = RetryConfig::default();
/// let result = with_retry_if(
///     &config,
///     &CancelToken::never(),
///     || async { Ok::<_, std::io::Error>("data") },
///     |e| e.kind() == std::io::ErrorKind::ConnectionReset,
/// )
/// .await;
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    cancel: &CancelToken,
    operation: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.calculate_delay(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis(),
                "Retrying operation after delay"
            );
            cancel.sleep(delay).await?;
        }

        match cancel.run(operation()).await? {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(error = %e, "Non-retryable error encountered");
                    return Err(RetryError::Failed(e));
                }

                if attempt >= config.max_retries {
                    warn!(
                        attempt = attempt,
                        max_retries = config.max_retries,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Failed(e));
                }

                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Operation failed, will retry"
                );
                attempt += 1;
            }
        }
    }
}
