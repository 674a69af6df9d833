//! Fetch orchestration and rate limiting
//!
//! This module hosts the engine that turns a date range into persisted call
//! records.
//!
//! # Overview
//!
//! 1. **Configuration**: describe the job with [`config::FetchConfig`]
//! 2. **Execution**: [`executor::FetchExecutor`] walks the job through its [`job::JobPhase`]s
//! 3. **Rate Limiting**: every request waits on one [`rate_limit::RateLimiter`]
//! 4. **Checkpointing**: progress goes through the single [`writer::CheckpointWriter`]
//! 5. **Reporting**: [`job::JobSummary`] and `[PROGRESS]` lines from [`progress`]
//!
//! [`list_calls`] walks the same pages without fetching transcripts.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use transcript_downloader::credentials::EnvCredentials;
//! use transcript_downloader::downloader::{run, FetchConfig};
//! use transcript_downloader::output::{DirectorySink, OutputOptions};
//! use transcript_downloader::DateRange;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = DateRange::parse("2023-01-01", "2023-01-02")?;
//! let sink = DirectorySink::open("./transcripts", &range, OutputOptions::default())?;
//! let config = FetchConfig::new(range)
//!     .with_concurrency(4)
//!     .with_checkpoint_dir("./transcripts/.resume");
//! let summary = run(config, &EnvCredentials, Arc::new(sink)).await?;
//! assert!(summary.failed_ids.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! A job ends in `Ok(JobSummary)`, possibly listing calls that gave up, or
//! in exactly one [`DownloadError`]:
//! - fatal API and sink errors halt the job
//! - rate limiting is retried indefinitely and never fails a job
//! - transient errors fail only the affected call, except on a list page
//! - checkpoint errors always halt the job

pub mod config;
pub mod executor;
pub mod job;
pub mod listing;
pub mod progress;
pub mod rate_limit;
pub mod writer;

pub use config::FetchConfig;
pub use executor::FetchExecutor;
pub use job::{JobPhase, JobSummary};
pub use listing::{CallLister, CallListing};
pub use progress::{ProgressState, ProgressTracker};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use writer::{CheckpointHandle, CheckpointWriter};

use crate::credentials::{CredentialError, CredentialSupplier};
use crate::fetcher::{ApiError, GongHttpClient};
use crate::output::ResultSink;
use crate::resume::{FileProgressStore, MemoryProgressStore, ProgressStore, ResumeError};
use crate::DateRange;
use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::info;

/// Reasons a job stops without a summary
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The API rejected a request outright
    #[error("fatal API error: {0}")]
    Fatal(String),

    /// A list page kept failing until the attempt ceiling
    #[error("listing failed after {attempts} attempts: {last_error}")]
    ListingExhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: ApiError,
    },

    /// Progress store error
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] ResumeError),

    /// The stored checkpoint belongs to another range
    #[error("checkpoint covers {found}, job covers {expected}")]
    CheckpointRangeMismatch {
        /// Range of this job
        expected: DateRange,
        /// Range in the checkpoint
        found: DateRange,
    },

    /// The result sink failed permanently
    #[error("output error: {0}")]
    Sink(String),

    /// Credentials could not be supplied
    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),

    /// Shutdown was requested; the checkpoint is kept
    #[error("cancelled by shutdown after {completed} calls")]
    Cancelled {
        /// Calls persisted before the shutdown
        completed: u64,
    },

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rate limiter construction failed
    #[error("rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Task join failure or other internal fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl DownloadError {
    /// Whether rerunning the same job can pick up where this one stopped
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::ListingExhausted { .. } | Self::Cancelled { .. } | Self::Sink(_) | Self::Fatal(_)
        )
    }
}

/// Fetch every call in `config.range` from the Gong API into `sink`.
///
/// Progress is kept under `config.checkpoint_dir` when set, in memory
/// otherwise.
pub async fn run(
    config: FetchConfig,
    credentials: &dyn CredentialSupplier,
    sink: Arc<dyn ResultSink>,
) -> Result<JobSummary, DownloadError> {
    run_with_progress(config, credentials, sink, None).await
}

/// [`run`], advancing `progress_bar` as calls are processed
pub async fn run_with_progress(
    config: FetchConfig,
    credentials: &dyn CredentialSupplier,
    sink: Arc<dyn ResultSink>,
    progress_bar: Option<ProgressBar>,
) -> Result<JobSummary, DownloadError> {
    config.validate().map_err(DownloadError::InvalidConfig)?;
    let client = http_client(&config, credentials)?;

    let store: Box<dyn ProgressStore> = match &config.checkpoint_dir {
        Some(dir) => Box::new(FileProgressStore::open(dir, config.range)?),
        None => Box::new(MemoryProgressStore::new(config.range)),
    };

    let mut executor = FetchExecutor::new(config, Arc::new(client), store, sink)?;
    if let Some(bar) = progress_bar {
        executor = executor.with_progress_bar(bar);
    }
    executor.execute().await
}

/// List every call in `config.range` that passes the title filter.
///
/// Only list pages are requested; nothing is written.
pub async fn list_calls(
    config: &FetchConfig,
    credentials: &dyn CredentialSupplier,
) -> Result<CallListing, DownloadError> {
    config.validate().map_err(DownloadError::InvalidConfig)?;
    let client = http_client(config, credentials)?;
    CallLister::new(config, Arc::new(client))?.list_all().await
}

fn http_client(
    config: &FetchConfig,
    credentials: &dyn CredentialSupplier,
) -> Result<GongHttpClient, DownloadError> {
    let credentials = credentials.credentials()?;
    info!(subdomain = credentials.subdomain(), "Using Gong workspace");
    let client = GongHttpClient::new(credentials, config.api_timeout)
        .map_err(|e| DownloadError::Fatal(e.to_string()))?;
    Ok(match &config.api_base_url {
        Some(url) => client.with_base_url(url.as_str()),
        None => client,
    })
}
