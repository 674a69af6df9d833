//! Remote API access
//!
//! [`CallsApi`] is the seam between the orchestrator and the network. The
//! Gong binding lives in [`http`]; [`retry`] wraps any implementation with
//! the rate limiter and the backoff rules.

use crate::{CallSummary, Cursor, DateRange, TranscriptOutcome};
use async_trait::async_trait;
use std::time::Duration;

pub mod classify;
pub mod http;
pub mod retry;
pub mod wire;

pub use classify::ErrorClass;
pub use http::GongHttpClient;
pub use retry::{Backoff, RetryError, RetryPolicy};

/// API errors, one handling rule per variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Network blip, timeout or 5xx; retried up to the attempt ceiling
    #[error("transient error: {0}")]
    Transient(String),

    /// 429; always retried, honoring the server delay when given
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Delay suggested by the `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// Bad credentials or malformed request; never retried, halts the job
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl ApiError {
    /// Whether this error halts the whole job
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// One page of call summaries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallPage {
    /// Calls on this page, in API order
    pub calls: Vec<CallSummary>,
    /// Token for the next page; `None` on the last page
    pub next_cursor: Option<Cursor>,
    /// Total calls in the range, when the API reports it
    pub total_records: Option<u64>,
}

/// Paginated call listing and per-call transcript retrieval
#[async_trait]
pub trait CallsApi: Send + Sync {
    /// Fetch one page of calls in `range`, starting at `cursor` (first page when `None`)
    async fn list_page(&self, range: &DateRange, cursor: Option<&Cursor>) -> ApiResult<CallPage>;

    /// Fetch the transcript of one call
    ///
    /// A call that was never transcribed yields [`TranscriptOutcome::NotAvailable`].
    async fn fetch_transcript(&self, range: &DateRange, call_id: &str)
        -> ApiResult<TranscriptOutcome>;
}
