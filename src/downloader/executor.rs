//! Fetch orchestrator
//!
//! Drives one job through `Resuming → Listing → Detailing → Advancing →
//! Draining → Done`. List pages are fetched one at a time; the calls of a
//! page fan out to a bounded pool of detail units. A call id is recorded in
//! the checkpoint only after the sink has written it, and the cursor moves
//! only after every unit of its page has finished. Calls that give up are
//! recorded too, so a resumed run still reports them.

use crate::downloader::config::FetchConfig;
use crate::downloader::job::{JobPhase, JobSummary};
use crate::downloader::listing;
use crate::downloader::progress::{ProgressState, ProgressTracker};
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::writer::{CheckpointHandle, CheckpointWriter};
use crate::downloader::DownloadError;
use crate::fetcher::retry::with_retry;
use crate::fetcher::{ApiError, CallPage, CallsApi, RetryError};
use crate::metrics::{self, JobMetrics};
use crate::output::{ResultSink, SinkError};
use crate::resume::ProgressStore;
use crate::shutdown::{self, SharedShutdown};
use crate::{CallRecord, CallSummary, Cursor, DateRange, TranscriptOutcome};
use chrono::NaiveTime;
use futures::StreamExt;
use indicatif::ProgressBar;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How one detail unit ended
enum UnitOutcome {
    Transcribed,
    Unavailable,
    /// Retries gave up; the call goes to the checkpoint's failed set
    Failed,
    /// Not started, or interrupted by shutdown before persisting
    Skipped,
    /// Error that halts the job
    Halted(DownloadError),
}

struct UnitReport {
    call_id: String,
    started_ms: i64,
    outcome: UnitOutcome,
}

/// Mutable state of one run
struct JobState {
    phase: JobPhase,
    summary: JobSummary,
    cursor: Option<Cursor>,
    completed: HashSet<String>,
    seen: HashSet<String>,
    /// Failures left by earlier runs on pages this run will not list again
    earlier_failures: BTreeSet<String>,
    progress: ProgressState,
}

impl JobState {
    fn enter(&mut self, phase: JobPhase) {
        debug!(from = %self.phase, to = %phase, "Job phase transition");
        self.phase = phase;
    }
}

/// Runs a single fetch job against any [`CallsApi`], [`ProgressStore`] and
/// [`ResultSink`]
pub struct FetchExecutor {
    config: FetchConfig,
    api: Arc<dyn CallsApi>,
    store: Option<Box<dyn ProgressStore>>,
    sink: Arc<dyn ResultSink>,
    limiter: RateLimiter,
    shutdown: Option<SharedShutdown>,
    progress_tracker: ProgressTracker,
    progress_bar: Option<ProgressBar>,
}

impl FetchExecutor {
    /// Validate `config` and build an executor with its own rate limiter
    pub fn new(
        config: FetchConfig,
        api: Arc<dyn CallsApi>,
        store: Box<dyn ProgressStore>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, DownloadError> {
        config.validate().map_err(DownloadError::InvalidConfig)?;
        let limiter = RateLimiter::per_second(config.rate_limit_per_sec)?;
        Ok(Self {
            config,
            api,
            store: Some(store),
            sink,
            limiter,
            shutdown: shutdown::get_global_shutdown(),
            progress_tracker: ProgressTracker::default(),
            progress_bar: None,
        })
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Share a limiter with other jobs instead of the executor's own
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Advance `bar` as calls are processed
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }

    /// Override progress tracking configuration.
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// Run the job to `Done` or to the first halting error
    pub async fn execute(self) -> Result<JobSummary, DownloadError> {
        let range = self.config.range;
        let span = info_span!("fetch_job", range = %range, dry_run = self.config.dry_run);
        async move {
            info!(
                concurrency = self.config.concurrency,
                rate_limit = self.config.rate_limit_per_sec,
                max_attempts = self.config.retry.max_attempts,
                "Starting fetch job"
            );
            let job_metrics = JobMetrics::start(range.to_string());
            let result = self.run_phases().await;
            match &result {
                Ok(summary) => {
                    job_metrics.record_success(summary.transcribed, summary.failed_ids.len() as u64);
                    info!(%summary, "Fetch job finished");
                }
                Err(e) => {
                    job_metrics.record_failure(&e.to_string());
                    error!(error = %e, "Fetch job failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_phases(mut self) -> Result<JobSummary, DownloadError> {
        let range = self.config.range;
        let store = self
            .store
            .take()
            .ok_or_else(|| DownloadError::Internal("progress store already taken".to_string()))?;
        let mut state = JobState {
            phase: JobPhase::Resuming,
            summary: JobSummary {
                dry_run: self.config.dry_run,
                ..JobSummary::default()
            },
            cursor: None,
            completed: HashSet::new(),
            seen: HashSet::new(),
            earlier_failures: BTreeSet::new(),
            progress: self
                .progress_tracker
                .create_state(None, Some(range_millis(&range))),
        };

        let store = self.resume(store, &mut state).await?;
        let writer = CheckpointWriter::spawn(store);
        let checkpoint = writer.handle();

        let outcome = self.sweep(&mut state, &checkpoint).await;

        state.enter(JobPhase::Draining);
        drop(checkpoint);
        let mut store = writer
            .close()
            .await
            .map_err(|e| DownloadError::Internal(format!("checkpoint writer panicked: {e}")))?;

        if let Err(e) = outcome {
            state.enter(JobPhase::Failed);
            if let Some(bar) = &self.progress_bar {
                bar.abandon();
            }
            return Err(e);
        }

        if !state.earlier_failures.is_empty() {
            let mut failed_ids: Vec<String> =
                std::mem::take(&mut state.earlier_failures).into_iter().collect();
            failed_ids.append(&mut state.summary.failed_ids);
            state.summary.failed_ids = failed_ids;
        }

        if !self.config.dry_run {
            blocking(move || store.clear()).await??;
            let sink = self.sink.clone();
            blocking(move || sink.finish())
                .await?
                .map_err(|e| DownloadError::Sink(e.to_string()))?;
        }

        state.enter(JobPhase::Done);
        if let Some(bar) = &self.progress_bar {
            bar.finish();
        }
        Ok(state.summary)
    }

    async fn resume(
        &self,
        mut store: Box<dyn ProgressStore>,
        state: &mut JobState,
    ) -> Result<Box<dyn ProgressStore>, DownloadError> {
        let range = self.config.range;
        let (store, loaded) = blocking(move || {
            let loaded = store.load();
            (store, loaded)
        })
        .await?;

        if let Some(checkpoint) = loaded? {
            if checkpoint.range != range {
                return Err(DownloadError::CheckpointRangeMismatch {
                    expected: range,
                    found: checkpoint.range,
                });
            }
            info!(
                cursor = checkpoint.cursor.as_ref().map(Cursor::as_str),
                completed = checkpoint.completed.len(),
                failed = checkpoint.failed.len(),
                "Resuming from checkpoint"
            );
            state.cursor = checkpoint.cursor;
            state.completed = checkpoint.completed.into_iter().collect();
            state.earlier_failures = checkpoint.failed;
        } else {
            debug!("No checkpoint found, starting from the first page");
        }
        Ok(store)
    }

    /// Page loop; returns once the API reports no further page
    async fn sweep(
        &self,
        state: &mut JobState,
        checkpoint: &CheckpointHandle,
    ) -> Result<(), DownloadError> {
        loop {
            state.enter(JobPhase::Listing);
            if self.shutdown_requested() {
                return Err(self.cancelled(state));
            }
            let page = self.list_page(state).await?;
            state.summary.pages += 1;
            let phase = format!("page {}", state.summary.pages);
            if let Some(bar) = &self.progress_bar {
                bar.set_message(format!("{} {phase}", self.config.range));
            }
            state.progress.set_phase(Some(phase));
            state.progress.set_total(page.total_records);
            if let (Some(bar), Some(total)) = (&self.progress_bar, page.total_records) {
                bar.set_length(total);
            }

            let queue = self.admit(state, checkpoint, page.calls).await?;
            info!(
                page = state.summary.pages,
                queued = queue.len(),
                total_records = page.total_records,
                "Listed page"
            );

            if !self.config.dry_run {
                state.enter(JobPhase::Detailing);
                self.detail(state, checkpoint, queue).await?;
            }

            state.enter(JobPhase::Advancing);
            match page.next_cursor {
                Some(next) => {
                    if !self.config.dry_run {
                        checkpoint.advance_cursor(&next).await?;
                    }
                    state.cursor = Some(next);
                }
                None => return Ok(()),
            }
        }
    }

    async fn list_page(&self, state: &JobState) -> Result<CallPage, DownloadError> {
        listing::list_page(
            &self.api,
            self.config.range,
            state.cursor.as_ref(),
            state.summary.pages + 1,
            &self.config.retry,
            &self.limiter,
            self.shutdown.as_deref(),
        )
        .await
        .map_err(|e| listing::listing_error(e, || self.cancelled(state)))
    }

    /// Dedupe, filter and drop already-completed calls from a page
    async fn admit(
        &self,
        state: &mut JobState,
        checkpoint: &CheckpointHandle,
        calls: Vec<CallSummary>,
    ) -> Result<Vec<CallSummary>, DownloadError> {
        let mut queue = Vec::with_capacity(calls.len());
        for call in calls {
            if !state.seen.insert(call.id.clone()) {
                debug!(call_id = %call.id, "Skipping duplicate call in listing");
                continue;
            }
            state.summary.listed += 1;

            if let Some(filter) = &self.config.title_filter {
                if !filter.matches(&call.title) {
                    state.summary.filtered += 1;
                    metrics::record_call_processed("filtered");
                    state.progress.update(1, Some(call.started.timestamp_millis()));
                    continue;
                }
            }
            // Listed again, so this run settles it
            state.earlier_failures.remove(&call.id);

            let in_checkpoint = state.completed.contains(&call.id);
            if in_checkpoint || self.sink.is_persisted(&call.id) {
                if !in_checkpoint && !self.config.dry_run {
                    checkpoint.record_completed(&call.id).await?;
                    state.completed.insert(call.id.clone());
                }
                state.summary.already_completed += 1;
                metrics::record_call_processed("already_completed");
                state.progress.update(1, Some(call.started.timestamp_millis()));
                continue;
            }

            if self.config.dry_run {
                debug!(call_id = %call.id, title = %call.title, "Would fetch transcript");
            }
            queue.push(call);
        }
        Ok(queue)
    }

    async fn detail(
        &self,
        state: &mut JobState,
        checkpoint: &CheckpointHandle,
        queue: Vec<CallSummary>,
    ) -> Result<(), DownloadError> {
        let halt = AtomicBool::new(false);
        let mut halted: Option<DownloadError> = None;
        let mut interrupted = false;

        let mut units = futures::stream::iter(queue)
            .map(|call| self.process_call(call, checkpoint, &halt))
            .buffer_unordered(self.config.concurrency);

        while let Some(report) = units.next().await {
            match report.outcome {
                UnitOutcome::Transcribed => {
                    state.summary.transcribed += 1;
                    state.completed.insert(report.call_id);
                }
                UnitOutcome::Unavailable => {
                    state.summary.unavailable += 1;
                    state.completed.insert(report.call_id);
                }
                UnitOutcome::Failed => state.summary.failed_ids.push(report.call_id),
                UnitOutcome::Skipped => {
                    interrupted = true;
                    continue;
                }
                UnitOutcome::Halted(e) => {
                    if halted.is_none() {
                        halted = Some(e);
                    }
                    continue;
                }
            }

            state.progress.update(1, Some(report.started_ms));
            if let Some(bar) = &self.progress_bar {
                bar.inc(1);
            }
            if state.progress.should_emit_update() {
                info!("{}", state.progress.format_progress());
                state.progress.mark_emitted();
            }
        }
        drop(units);

        if let Some(e) = halted {
            return Err(e);
        }
        if interrupted || self.shutdown_requested() {
            return Err(self.cancelled(state));
        }
        Ok(())
    }

    async fn process_call(
        &self,
        call: CallSummary,
        checkpoint: &CheckpointHandle,
        halt: &AtomicBool,
    ) -> UnitReport {
        let call_id = call.id.clone();
        let started_ms = call.started.timestamp_millis();
        let report = |outcome| UnitReport {
            call_id: call_id.clone(),
            started_ms,
            outcome,
        };

        if halt.load(Ordering::SeqCst) || self.shutdown_requested() {
            return report(UnitOutcome::Skipped);
        }

        let transcript = if call.transcript_available {
            match self.fetch_transcript(&call.id).await {
                Ok(outcome) => outcome,
                Err(RetryError::Fatal(message)) => {
                    halt.store(true, Ordering::SeqCst);
                    return report(UnitOutcome::Halted(DownloadError::Fatal(message)));
                }
                Err(RetryError::Exhausted { attempts, last_error }) => {
                    warn!(call_id = %call_id, attempts, error = %last_error, "Giving up on transcript");
                    return report(Self::give_up(&call_id, checkpoint, halt).await);
                }
                Err(RetryError::Cancelled) => return report(UnitOutcome::Skipped),
            }
        } else {
            debug!(call_id = %call_id, "Call has no transcript, skipping fetch");
            TranscriptOutcome::NotAvailable
        };

        let transcribed = transcript.transcript().is_some();
        let record = Arc::new(CallRecord {
            summary: call,
            transcript,
        });

        match self.write_record(record).await {
            Ok(()) => {}
            Err(RetryError::Fatal(message)) => {
                halt.store(true, Ordering::SeqCst);
                return report(UnitOutcome::Halted(DownloadError::Sink(message)));
            }
            Err(RetryError::Exhausted { attempts, last_error }) => {
                warn!(call_id = %call_id, attempts, error = %last_error, "Giving up on sink write");
                return report(Self::give_up(&call_id, checkpoint, halt).await);
            }
            Err(RetryError::Cancelled) => return report(UnitOutcome::Skipped),
        }

        if let Err(e) = checkpoint.record_completed(&call_id).await {
            halt.store(true, Ordering::SeqCst);
            return report(UnitOutcome::Halted(DownloadError::Checkpoint(e)));
        }

        if transcribed {
            metrics::record_call_processed("transcribed");
            report(UnitOutcome::Transcribed)
        } else {
            metrics::record_call_processed("unavailable");
            report(UnitOutcome::Unavailable)
        }
    }

    /// Keep a call that exhausted its retries in the checkpoint's failed set
    async fn give_up(call_id: &str, checkpoint: &CheckpointHandle, halt: &AtomicBool) -> UnitOutcome {
        if let Err(e) = checkpoint.record_failed(call_id).await {
            halt.store(true, Ordering::SeqCst);
            return UnitOutcome::Halted(DownloadError::Checkpoint(e));
        }
        metrics::record_call_processed("failed");
        UnitOutcome::Failed
    }

    async fn fetch_transcript(&self, call_id: &str) -> Result<TranscriptOutcome, RetryError> {
        let range = self.config.range;
        with_retry(
            &format!("fetch transcript {call_id}"),
            &self.config.retry,
            Some(&self.limiter),
            self.shutdown.as_deref(),
            || {
                let api = Arc::clone(&self.api);
                let call_id = call_id.to_string();
                async move { api.fetch_transcript(&range, &call_id).await }
            },
        )
        .await
    }

    /// Sink writes run on the blocking pool and are not cancelled by shutdown
    async fn write_record(&self, record: Arc<CallRecord>) -> Result<(), RetryError> {
        let operation = format!("write call {}", record.summary.id);
        with_retry(&operation, &self.config.retry, None, None, || {
            let sink = Arc::clone(&self.sink);
            let record = Arc::clone(&record);
            async move {
                match tokio::task::spawn_blocking(move || sink.write(&record)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(SinkError::Transient(m))) => Err(ApiError::Transient(m)),
                    Ok(Err(SinkError::Fatal(m))) => Err(ApiError::Fatal(m)),
                    Err(e) => Err(ApiError::Fatal(format!("sink task failed: {e}"))),
                }
            }
        })
        .await
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    fn cancelled(&self, state: &JobState) -> DownloadError {
        info!(
            completed = state.summary.persisted(),
            "Shutdown requested - checkpoint kept for resume"
        );
        DownloadError::Cancelled {
            completed: state.summary.persisted(),
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DownloadError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DownloadError::Internal(format!("blocking task failed: {e}")))
}

/// `[start, end)` of the range in Unix milliseconds
fn range_millis(range: &DateRange) -> (i64, i64) {
    let start = range.start.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    let end = range.end.and_time(NaiveTime::MIN).and_utc().timestamp_millis() + 86_400_000;
    (start, end)
}
