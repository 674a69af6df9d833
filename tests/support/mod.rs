//! Shared fixtures: a scripted API and a counting sink

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use transcript_downloader::downloader::FetchConfig;
use transcript_downloader::fetcher::{ApiError, ApiResult, CallPage, CallsApi, RetryPolicy};
use transcript_downloader::output::{ResultSink, SinkError, SinkResult};
use transcript_downloader::shutdown::SharedShutdown;
use transcript_downloader::{
    CallRecord, CallSummary, Cursor, DateRange, Participant, ParticipantContext, Transcript,
    TranscriptOutcome, Utterance,
};

pub fn range() -> DateRange {
    DateRange::parse("2023-01-01", "2023-01-02").unwrap()
}

/// Call `id` starting on 2023-01-01 at `10:{minute}`
pub fn call(id: &str) -> CallSummary {
    let minute = id.parse::<u32>().unwrap_or(0) % 60;
    CallSummary {
        id: id.to_string(),
        started: Utc.with_ymd_and_hms(2023, 1, 1, 10, minute, 0).unwrap(),
        duration_secs: 600,
        title: format!("Call {id}"),
        direction: Some("Conference".to_string()),
        meeting_url: None,
        participants: vec![Participant {
            name: Some("Ada Lovelace".to_string()),
            email: Some("ada@acme.io".to_string()),
            context: ParticipantContext::Internal,
            speaker_id: Some("s1".to_string()),
            ..Participant::default()
        }],
        transcript_available: true,
    }
}

pub fn transcript(id: &str) -> Transcript {
    Transcript {
        call_id: id.to_string(),
        utterances: vec![Utterance {
            speaker_id: Some("s1".to_string()),
            topic: None,
            start_ms: 0,
            end_ms: 1500,
            text: format!("Hello from call {id}"),
        }],
    }
}

/// Config with a generous budget and millisecond backoff
pub fn fast_config(range: DateRange) -> FetchConfig {
    FetchConfig::new(range)
        .with_rate_limit(1000.0)
        .with_retry(RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: false,
        })
}

pub fn page_cursor(index: usize) -> Option<Cursor> {
    (index > 0).then(|| Cursor::new(format!("page-{index}")))
}

/// [`CallsApi`] serving fixed pages and per-call scripted failures
#[derive(Default)]
pub struct ScriptedApi {
    pages: Vec<Vec<CallSummary>>,
    report_total: bool,
    unavailable: HashSet<String>,
    transcript_errors: Mutex<HashMap<String, VecDeque<ApiError>>>,
    list_errors: Mutex<HashMap<usize, VecDeque<ApiError>>>,
    list_calls: Mutex<Vec<Option<Cursor>>>,
    transcript_calls: Mutex<HashMap<String, u32>>,
    shutdown_after: Option<(u32, SharedShutdown)>,
    transcript_total: AtomicU32,
}

impl ScriptedApi {
    pub fn new(pages: Vec<Vec<CallSummary>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// One page per call id group
    pub fn with_ids(pages: &[&[&str]]) -> Self {
        Self::new(
            pages
                .iter()
                .map(|ids| ids.iter().map(|id| call(id)).collect())
                .collect(),
        )
    }

    pub fn with_total_records(mut self) -> Self {
        self.report_total = true;
        self
    }

    pub fn with_unavailable(mut self, id: &str) -> Self {
        self.unavailable.insert(id.to_string());
        self
    }

    /// Fail the first `times` transcript fetches of `id` with `error`
    pub fn with_transcript_errors(self, id: &str, times: usize, error: ApiError) -> Self {
        self.transcript_errors
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    /// Fail the first `times` fetches of page `index` with `error`
    pub fn with_list_errors(self, index: usize, times: usize, error: ApiError) -> Self {
        self.list_errors
            .lock()
            .unwrap()
            .entry(index)
            .or_default()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    /// Request shutdown from inside the `n`th transcript fetch
    pub fn with_shutdown_after(mut self, n: u32, shutdown: SharedShutdown) -> Self {
        self.shutdown_after = Some((n, shutdown));
        self
    }

    pub fn transcript_fetches(&self, id: &str) -> u32 {
        self.transcript_calls
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_transcript_fetches(&self) -> u32 {
        self.transcript_total.load(Ordering::SeqCst)
    }

    /// Cursors passed to `list_page`, in order
    pub fn list_requests(&self) -> Vec<Option<Cursor>> {
        self.list_calls.lock().unwrap().clone()
    }

    fn page_index(&self, cursor: Option<&Cursor>) -> ApiResult<usize> {
        match cursor {
            None => Ok(0),
            Some(c) => c
                .as_str()
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .filter(|&n: &usize| n < self.pages.len())
                .ok_or_else(|| ApiError::Fatal(format!("unknown cursor {c}"))),
        }
    }
}

#[async_trait]
impl CallsApi for ScriptedApi {
    async fn list_page(&self, _range: &DateRange, cursor: Option<&Cursor>) -> ApiResult<CallPage> {
        self.list_calls.lock().unwrap().push(cursor.cloned());
        let index = self.page_index(cursor)?;
        if let Some(error) = self
            .list_errors
            .lock()
            .unwrap()
            .get_mut(&index)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(CallPage {
            calls: self.pages.get(index).cloned().unwrap_or_default(),
            next_cursor: page_cursor(index + 1).filter(|_| index + 1 < self.pages.len()),
            total_records: self
                .report_total
                .then(|| self.pages.iter().map(Vec::len).sum::<usize>() as u64),
        })
    }

    async fn fetch_transcript(
        &self,
        _range: &DateRange,
        call_id: &str,
    ) -> ApiResult<TranscriptOutcome> {
        *self
            .transcript_calls
            .lock()
            .unwrap()
            .entry(call_id.to_string())
            .or_default() += 1;
        let total = self.transcript_total.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, shutdown)) = &self.shutdown_after {
            if total == *n {
                shutdown.request_shutdown();
            }
        }

        if let Some(error) = self
            .transcript_errors
            .lock()
            .unwrap()
            .get_mut(call_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if self.unavailable.contains(call_id) {
            return Ok(TranscriptOutcome::NotAvailable);
        }
        Ok(TranscriptOutcome::Available(transcript(call_id)))
    }
}

/// In-memory [`ResultSink`] that counts writes per call
#[derive(Default)]
pub struct CountingSink {
    records: Mutex<HashMap<String, CallRecord>>,
    writes: Mutex<HashMap<String, u32>>,
    failures: Mutex<VecDeque<SinkError>>,
    finished: AtomicU32,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next writes with these errors, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = SinkError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn writes(&self, id: &str) -> u32 {
        self.writes.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> u32 {
        self.writes.lock().unwrap().values().sum()
    }

    pub fn record(&self, id: &str) -> Option<CallRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn persisted_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn finish_calls(&self) -> u32 {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ResultSink for CountingSink {
    fn write(&self, record: &CallRecord) -> SinkResult<()> {
        let id = record.summary.id.clone();
        *self.writes.lock().unwrap().entry(id.clone()).or_default() += 1;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.records.lock().unwrap().insert(id, record.clone());
        Ok(())
    }

    fn is_persisted(&self, call_id: &str) -> bool {
        self.records.lock().unwrap().contains_key(call_id)
    }

    fn finish(&self) -> SinkResult<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
