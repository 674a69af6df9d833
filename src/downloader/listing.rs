//! Call listing without transcripts
//!
//! Walks every page of a range under the same rate limit and retry rules as
//! a fetch job. Nothing is checkpointed and no transcript is requested.

use crate::downloader::config::FetchConfig;
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::DownloadError;
use crate::fetcher::retry::{with_retry, RetryPolicy};
use crate::fetcher::{CallPage, CallsApi, RetryError};
use crate::filter::TitleFilter;
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator};
use crate::{CallSummary, Cursor, DateRange};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Calls found in a range
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallListing {
    /// Calls that passed the title filter, in listing order
    pub calls: Vec<CallSummary>,
    /// Distinct calls the API returned
    pub listed: u64,
    /// Calls dropped by the title filter
    pub filtered: u64,
    /// Pages fetched
    pub pages: u64,
}

/// Fetch one list page with retries and the shared rate limit
pub(crate) async fn list_page(
    api: &Arc<dyn CallsApi>,
    range: DateRange,
    cursor: Option<&Cursor>,
    page_number: u64,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    shutdown: Option<&ShutdownCoordinator>,
) -> Result<CallPage, RetryError> {
    let operation = format!("list calls page {page_number}");
    with_retry(&operation, policy, Some(limiter), shutdown, || {
        let api = Arc::clone(api);
        let cursor = cursor.cloned();
        async move { api.list_page(&range, cursor.as_ref()).await }
    })
    .await
}

/// Map a list page failure to the job error it causes
pub(crate) fn listing_error(
    error: RetryError,
    cancelled: impl FnOnce() -> DownloadError,
) -> DownloadError {
    match error {
        RetryError::Fatal(message) => DownloadError::Fatal(message),
        RetryError::Exhausted {
            attempts,
            last_error,
        } => DownloadError::ListingExhausted {
            attempts,
            last_error,
        },
        RetryError::Cancelled => cancelled(),
    }
}

/// Lists every call in a range
pub struct CallLister {
    api: Arc<dyn CallsApi>,
    range: DateRange,
    retry: RetryPolicy,
    title_filter: Option<TitleFilter>,
    limiter: RateLimiter,
    shutdown: Option<SharedShutdown>,
}

impl CallLister {
    /// Lister using the range, filter, budget and retry policy of `config`
    pub fn new(config: &FetchConfig, api: Arc<dyn CallsApi>) -> Result<Self, DownloadError> {
        config.validate().map_err(DownloadError::InvalidConfig)?;
        Ok(Self {
            api,
            range: config.range,
            retry: config.retry,
            title_filter: config.title_filter.clone(),
            limiter: RateLimiter::per_second(config.rate_limit_per_sec)?,
            shutdown: shutdown::get_global_shutdown(),
        })
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Walk every page; duplicates across pages are kept once
    pub async fn list_all(&self) -> Result<CallListing, DownloadError> {
        let mut listing = CallListing::default();
        let mut seen = HashSet::new();
        let mut cursor: Option<Cursor> = None;

        loop {
            let page = list_page(
                &self.api,
                self.range,
                cursor.as_ref(),
                listing.pages + 1,
                &self.retry,
                &self.limiter,
                self.shutdown.as_deref(),
            )
            .await
            .map_err(|e| listing_error(e, || DownloadError::Cancelled { completed: 0 }))?;
            listing.pages += 1;

            for call in page.calls {
                if !seen.insert(call.id.clone()) {
                    debug!(call_id = %call.id, "Skipping duplicate call in listing");
                    continue;
                }
                listing.listed += 1;
                match &self.title_filter {
                    Some(filter) if !filter.matches(&call.title) => listing.filtered += 1,
                    _ => listing.calls.push(call),
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            range = %self.range,
            pages = listing.pages,
            listed = listing.listed,
            matched = listing.calls.len(),
            "Listing finished"
        );
        Ok(listing)
    }
}
