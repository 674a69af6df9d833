//! Fetch configuration and tuning constants

use crate::fetcher::RetryPolicy;
use crate::filter::TitleFilter;
use crate::DateRange;
use std::path::PathBuf;
use std::time::Duration;

/// Attempt ceiling for transient failures (total attempts, not retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Upper bound accepted for the attempt ceiling.
pub const MAX_ATTEMPTS_LIMIT: u32 = 20;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Default API budget in calls per second.
pub const DEFAULT_RATE_LIMIT: f64 = 2.5;

/// Default number of concurrent detail fetches.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Largest accepted worker pool.
pub const MAX_CONCURRENCY: usize = 32;

/// Default per-request timeout in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 60;

/// Calculate exponential backoff delay for a 1-based attempt number.
///
/// `INITIAL_BACKOFF_MS * 2^(attempt-1)`, capped at `MAX_BACKOFF_MS`.
pub fn calculate_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.pow(exponent));
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Settings for one fetch job
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Calendar range to sweep
    pub range: DateRange,
    /// Detail-fetch worker pool size
    pub concurrency: usize,
    /// API budget in calls per second, shared by listing and detail fetches
    pub rate_limit_per_sec: f64,
    /// Backoff and attempt ceiling
    pub retry: RetryPolicy,
    /// Per-request timeout
    pub api_timeout: Duration,
    /// Optional title filter applied during listing
    pub title_filter: Option<TitleFilter>,
    /// List only; no detail fetches, sink writes or checkpoint writes
    pub dry_run: bool,
    /// Directory for the file checkpoint; in-memory progress when `None`
    pub checkpoint_dir: Option<PathBuf>,
    /// API host replacing the account's default
    pub api_base_url: Option<String>,
}

impl FetchConfig {
    /// Defaults for `range`
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT,
            retry: RetryPolicy::default(),
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            title_filter: None,
            dry_run: false,
            checkpoint_dir: None,
            api_base_url: None,
        }
    }

    /// Set the worker pool size
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the API budget
    pub fn with_rate_limit(mut self, per_sec: f64) -> Self {
        self.rate_limit_per_sec = per_sec;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-request timeout
    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    /// Set the title filter
    pub fn with_title_filter(mut self, filter: Option<TitleFilter>) -> Self {
        self.title_filter = filter;
        self
    }

    /// Enable or disable dry-run
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Persist progress under `dir`
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Send requests to `url` instead of `https://{subdomain}.api.gong.io`
    pub fn with_api_base_url(mut self, url: Option<String>) -> Self {
        self.api_base_url = url;
        self
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            ));
        }
        if !self.rate_limit_per_sec.is_finite() || self.rate_limit_per_sec <= 0.0 {
            return Err(format!(
                "rate limit must be a positive number of calls per second, got {}",
                self.rate_limit_per_sec
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(format!(
                "max attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}, got {}",
                self.retry.max_attempts
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err("initial backoff exceeds maximum backoff".to_string());
        }
        if self.api_timeout.is_zero() {
            return Err("API timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}
