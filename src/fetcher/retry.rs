//! Retry driver
//!
//! Applies one rule per [`ApiError`] variant:
//!
//! - `Transient`: exponential backoff with jitter, at most `max_attempts` attempts
//! - `RateLimited`: retried without limit, waiting `Retry-After` when present
//! - `Fatal`: returned immediately
//!
//! Every attempt is admitted by the shared [`RateLimiter`] first, and every
//! wait gives way to a shutdown request.

use super::classify::RetryContext;
use super::ApiError;
use crate::downloader::config::{DEFAULT_MAX_ATTEMPTS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS};
use crate::downloader::rate_limit::RateLimiter;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Backoff shape and attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient failures
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Add up to 10% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` and default delays
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// `base * 2^(attempt-1)` capped at `max_delay`, without jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(31));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Fresh delay sequence
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempt: 0,
            last: Duration::ZERO,
        }
    }
}

/// Sequence of non-decreasing delays for one operation
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let mut delay = self.policy.backoff_delay(self.attempt);
        if self.policy.jitter && !delay.is_zero() {
            let spread = delay.as_millis() as u64 / 10;
            if spread > 0 {
                delay += Duration::from_millis(rand::thread_rng().gen_range(0..=spread));
            }
            delay = delay.min(self.policy.max_delay);
        }
        // Jitter must never make a later delay shorter than an earlier one.
        self.last = self.last.max(delay);
        self.last
    }

    /// Delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Why an operation gave up
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// Non-retryable failure
    #[error("{0}")]
    Fatal(String),

    /// Transient failures reached the attempt ceiling
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: ApiError,
    },

    /// Shutdown was requested while waiting
    #[error("cancelled by shutdown")]
    Cancelled,
}

async fn wait_or_cancel(
    shutdown: Option<&ShutdownCoordinator>,
    wait: impl Future<Output = ()>,
) -> Result<(), RetryError> {
    match shutdown {
        Some(shutdown) => tokio::select! {
            _ = wait => Ok(()),
            _ = shutdown.wait_for_shutdown() => Err(RetryError::Cancelled),
        },
        None => {
            wait.await;
            Ok(())
        }
    }
}

/// Run `call` until it succeeds or the policy gives up.
///
/// `limiter` is `None` for operations that do not touch the API (sink
/// writes share the attempt ceiling but not the request budget).
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    limiter: Option<&RateLimiter>,
    shutdown: Option<&ShutdownCoordinator>,
    mut call: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut transient = policy.backoff();
    let mut throttled = policy.backoff();
    let mut failures = 0u32;

    loop {
        if shutdown.is_some_and(|s| s.is_shutdown_requested()) {
            return Err(RetryError::Cancelled);
        }
        if let Some(limiter) = limiter {
            wait_or_cancel(shutdown, limiter.acquire()).await?;
        }

        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let delay = match &error {
            ApiError::Fatal(message) => return Err(RetryError::Fatal(message.clone())),
            ApiError::RateLimited { retry_after } => {
                let delay = retry_after.unwrap_or_else(|| throttled.next_delay());
                let ctx = RetryContext {
                    operation,
                    attempt: failures,
                    max_attempts: policy.max_attempts,
                    backoff: delay,
                };
                warn!(operation = operation, "{}", ctx.format_retry(&error));
                delay
            }
            ApiError::Transient(_) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    let ctx = RetryContext {
                        operation,
                        attempt: failures,
                        max_attempts: policy.max_attempts,
                        backoff: Duration::ZERO,
                    };
                    error!(operation = operation, "{}", ctx.format_failure(&error));
                    return Err(RetryError::Exhausted {
                        attempts: failures,
                        last_error: error,
                    });
                }
                let delay = transient.next_delay();
                let ctx = RetryContext {
                    operation,
                    attempt: failures,
                    max_attempts: policy.max_attempts,
                    backoff: delay,
                };
                warn!(operation = operation, attempt = failures, "{}", ctx.format_retry(&error));
                delay
            }
        };

        metrics::record_retry_backoff(delay, failures);
        wait_or_cancel(shutdown, tokio::time::sleep(delay)).await?;
    }
}
