//! End-to-end orchestrator runs against a scripted API

use crate::support::{call, fast_config, range, CountingSink, ScriptedApi};
use indicatif::ProgressBar;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use transcript_downloader::downloader::{DownloadError, FetchConfig, FetchExecutor, JobSummary};
use transcript_downloader::fetcher::ApiError;
use transcript_downloader::filter::TitleFilter;
use transcript_downloader::output::SinkError;
use transcript_downloader::resume::{
    FileProgressStore, MemoryProgressStore, ProgressCheckpoint, ProgressStore, StoreEvent,
};
use transcript_downloader::shutdown::{ShutdownCoordinator, SharedShutdown};
use transcript_downloader::{Cursor, DateRange, TranscriptOutcome};

async fn run_job(
    config: FetchConfig,
    api: &Arc<ScriptedApi>,
    store: impl ProgressStore + 'static,
    sink: &Arc<CountingSink>,
    shutdown: SharedShutdown,
) -> Result<JobSummary, DownloadError> {
    FetchExecutor::new(config, api.clone(), Box::new(store), sink.clone())
        .unwrap()
        .with_shutdown(shutdown)
        .execute()
        .await
}

async fn run_simple(
    config: FetchConfig,
    api: &Arc<ScriptedApi>,
    store: impl ProgressStore + 'static,
    sink: &Arc<CountingSink>,
) -> Result<JobSummary, DownloadError> {
    run_job(config, api, store, sink, ShutdownCoordinator::shared()).await
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_two_pages_with_unavailable_and_exhausted_call() {
    let api = Arc::new(
        ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]])
            .with_unavailable("3")
            .with_transcript_errors("4", 6, ApiError::Transient("HTTP 503".to_string())),
    );
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();

    let summary = run_simple(fast_config(range()), &api, store, &sink)
        .await
        .unwrap();

    assert_eq!(summary.listed, 4);
    assert_eq!(summary.transcribed, 2);
    assert_eq!(summary.unavailable, 1);
    assert_eq!(summary.failed_ids, vec!["4".to_string()]);
    assert_eq!(summary.pages, 2);
    assert!(!summary.is_clean());

    assert_eq!(api.transcript_fetches("4"), 5);
    let cleared = inspect.last_cleared().expect("checkpoint cleared on success");
    assert_eq!(cleared.completed, ids(&["1", "2", "3"]));
    assert_eq!(cleared.failed, ids(&["4"]));
    assert_eq!(cleared.cursor, Some(Cursor::new("page-1")));
    assert!(inspect.current().is_none());

    assert_eq!(sink.persisted_ids(), vec!["1", "2", "3"]);
    assert_eq!(
        sink.record("3").unwrap().transcript,
        TranscriptOutcome::NotAvailable
    );
    assert_eq!(sink.finish_calls(), 1);
}

#[tokio::test]
async fn test_fatal_on_first_page_fetches_nothing() {
    let pages: Vec<Vec<_>> = (0..10)
        .map(|p| (0..3).map(|i| call(&format!("{}", p * 3 + i + 1))).collect())
        .collect();
    let api = Arc::new(ScriptedApi::new(pages).with_list_errors(
        0,
        1,
        ApiError::Fatal("HTTP 401 Unauthorized".to_string()),
    ));
    let sink = Arc::new(CountingSink::new());

    let err = run_simple(
        fast_config(range()),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Fatal(ref m) if m.contains("401")));
    assert_eq!(api.list_requests().len(), 1);
    assert_eq!(api.total_transcript_fetches(), 0);
    assert_eq!(sink.total_writes(), 0);
    assert_eq!(sink.finish_calls(), 0);
}

#[tokio::test]
async fn test_fatal_transcript_halts_and_keeps_checkpoint() {
    let api = Arc::new(
        ScriptedApi::with_ids(&[&["1", "2", "3"]])
            .with_transcript_errors("2", 1, ApiError::Fatal("HTTP 403".to_string())),
    );
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();

    let err = run_simple(
        fast_config(range()).with_concurrency(1),
        &api,
        store,
        &sink,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Fatal(_)));
    assert_eq!(api.transcript_fetches("2"), 1);
    assert_eq!(api.transcript_fetches("3"), 0);
    assert!(inspect.last_cleared().is_none());
    assert_eq!(inspect.current().unwrap().completed, ids(&["1"]));
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let sink = Arc::new(CountingSink::new());
    let first = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]));
    run_simple(
        fast_config(range()),
        &first,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap();

    let second = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]));
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();
    let summary = run_simple(fast_config(range()), &second, store, &sink)
        .await
        .unwrap();

    assert_eq!(second.total_transcript_fetches(), 0);
    assert_eq!(summary.already_completed, 4);
    assert_eq!(summary.transcribed, 0);
    assert_eq!(sink.persisted_ids(), vec!["1", "2", "3", "4"]);
    assert_eq!(sink.total_writes(), 4);
    // ids found in the sink are carried into the checkpoint
    assert_eq!(
        inspect.last_cleared().unwrap().completed,
        ids(&["1", "2", "3", "4"])
    );
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_refetching() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CountingSink::new());
    let config = fast_config(range())
        .with_concurrency(1)
        .with_checkpoint_dir(dir.path());

    let shutdown = ShutdownCoordinator::shared();
    let first = Arc::new(
        ScriptedApi::with_ids(&[&["1", "2", "3", "4"]]).with_shutdown_after(2, shutdown.clone()),
    );
    let store = FileProgressStore::open(dir.path(), range()).unwrap();
    let err = run_job(config.clone(), &first, store, &sink, shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled { completed: 2 }));
    assert!(err.is_resumable());
    assert_eq!(first.total_transcript_fetches(), 2);

    let checkpoint_path = FileProgressStore::path_for(dir.path(), &range());
    assert!(checkpoint_path.exists());

    let second = Arc::new(ScriptedApi::with_ids(&[&["1", "2", "3", "4"]]));
    let store = FileProgressStore::open(dir.path(), range()).unwrap();
    let summary = run_simple(config, &second, store, &sink).await.unwrap();

    assert_eq!(summary.transcribed, 2);
    assert_eq!(summary.already_completed, 2);
    assert_eq!(second.transcript_fetches("1"), 0);
    assert_eq!(second.transcript_fetches("2"), 0);
    for id in ["1", "2", "3", "4"] {
        assert_eq!(sink.writes(id), 1, "call {id} written more than once");
    }
    assert!(!checkpoint_path.exists());
}

#[tokio::test]
async fn test_failure_on_earlier_page_is_reported_after_resume() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CountingSink::new());
    let config = fast_config(range())
        .with_concurrency(1)
        .with_checkpoint_dir(dir.path());

    // Fetches 2..=6 exhaust call 2; shutdown arrives during fetch 7 (call 3)
    let shutdown = ShutdownCoordinator::shared();
    let first = Arc::new(
        ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]])
            .with_transcript_errors("2", 6, ApiError::Transient("HTTP 503".to_string()))
            .with_shutdown_after(7, shutdown.clone()),
    );
    let store = FileProgressStore::open(dir.path(), range()).unwrap();
    let err = run_job(config.clone(), &first, store, &sink, shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled { completed: 2 }));
    assert_eq!(first.transcript_fetches("2"), 5);

    let mut reader = FileProgressStore::open(dir.path(), range()).unwrap();
    let kept = reader.load().unwrap().unwrap();
    assert_eq!(kept.cursor, Some(Cursor::new("page-1")));
    assert_eq!(kept.failed, ids(&["2"]));
    drop(reader);

    let second = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]));
    let store = FileProgressStore::open(dir.path(), range()).unwrap();
    let summary = run_simple(config, &second, store, &sink).await.unwrap();

    assert_eq!(second.list_requests(), vec![Some(Cursor::new("page-1"))]);
    assert_eq!(second.transcript_fetches("2"), 0);
    assert_eq!(summary.transcribed, 1);
    assert_eq!(summary.already_completed, 1);
    assert_eq!(summary.failed_ids, vec!["2".to_string()]);
    assert!(!summary.is_clean());
    assert_eq!(sink.persisted_ids(), vec!["1", "3", "4"]);
    assert!(!FileProgressStore::path_for(dir.path(), &range()).exists());
}

#[tokio::test]
async fn test_failed_call_on_relisted_page_is_retried() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CountingSink::new());
    let config = fast_config(range())
        .with_concurrency(1)
        .with_checkpoint_dir(dir.path());

    let shutdown = ShutdownCoordinator::shared();
    let first = Arc::new(
        ScriptedApi::with_ids(&[&["1", "2", "3"]])
            .with_transcript_errors("2", 6, ApiError::Transient("HTTP 503".to_string()))
            .with_shutdown_after(7, shutdown.clone()),
    );
    let store = FileProgressStore::open(dir.path(), range()).unwrap();
    let err = run_job(config.clone(), &first, store, &sink, shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled { .. }));

    let second = Arc::new(ScriptedApi::with_ids(&[&["1", "2", "3"]]));
    let store = FileProgressStore::open(dir.path(), range()).unwrap();
    let summary = run_simple(config, &second, store, &sink).await.unwrap();

    assert_eq!(second.transcript_fetches("2"), 1);
    assert_eq!(summary.transcribed, 1);
    assert!(summary.failed_ids.is_empty());
    assert_eq!(sink.persisted_ids(), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_shutdown_before_start_lists_nothing() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1"]]));
    let sink = Arc::new(CountingSink::new());
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let err = run_job(
        fast_config(range()),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
        shutdown,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DownloadError::Cancelled { completed: 0 }));
    assert!(api.list_requests().is_empty());
}

#[tokio::test]
async fn test_checkpoint_for_other_range_is_rejected() {
    let other = DateRange::parse("2023-02-01", "2023-02-02").unwrap();
    let api = Arc::new(ScriptedApi::with_ids(&[&["1"]]));
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::with_checkpoint(ProgressCheckpoint::new(other));

    let err = run_simple(fast_config(range()), &api, store, &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::CheckpointRangeMismatch { found, .. } if found == other
    ));
    assert!(api.list_requests().is_empty());
}

#[tokio::test]
async fn test_store_failure_halts_job() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"]]));
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::new(range());
    store.handle().set_fail_writes(true);

    let err = run_simple(fast_config(range()).with_concurrency(1), &api, store, &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Checkpoint(_)));
    assert!(!err.is_resumable());
    assert_eq!(sink.finish_calls(), 0);
}

#[tokio::test]
async fn test_fatal_sink_error_halts_job() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"]]));
    let sink = Arc::new(CountingSink::new());
    sink.fail_next([SinkError::Fatal("disk full".to_string())]);
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();

    let err = run_simple(fast_config(range()).with_concurrency(1), &api, store, &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Sink(ref m) if m.contains("disk full")));
    assert_eq!(sink.writes("1"), 1);
    assert_eq!(sink.writes("2"), 0);
    assert!(inspect.last_cleared().is_none());
}

#[tokio::test]
async fn test_transient_sink_error_is_retried() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"]]));
    let sink = Arc::new(CountingSink::new());
    sink.fail_next([
        SinkError::Transient("interrupted".to_string()),
        SinkError::Transient("interrupted".to_string()),
    ]);

    let summary = run_simple(
        fast_config(range()).with_concurrency(1),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.transcribed, 2);
    assert_eq!(sink.writes("1"), 3);
    assert_eq!(api.transcript_fetches("1"), 1);
}

#[tokio::test]
async fn test_rate_limited_is_retried_past_the_ceiling() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1"]]).with_transcript_errors(
        "1",
        7,
        ApiError::RateLimited {
            retry_after: Some(Duration::from_millis(1)),
        },
    ));
    let sink = Arc::new(CountingSink::new());

    let summary = run_simple(
        fast_config(range()),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.transcribed, 1);
    assert!(summary.failed_ids.is_empty());
    assert_eq!(api.transcript_fetches("1"), 8);
}

#[tokio::test]
async fn test_exhausted_listing_fails_job_and_keeps_checkpoint() {
    let api = Arc::new(
        ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]).with_list_errors(
            1,
            5,
            ApiError::Transient("connection reset".to_string()),
        ),
    );
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();

    let err = run_simple(fast_config(range()), &api, store, &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::ListingExhausted { attempts: 5, .. }
    ));
    let kept = inspect.current().unwrap();
    assert_eq!(kept.cursor, Some(Cursor::new("page-1")));
    assert_eq!(kept.completed, ids(&["1", "2"]));
}

#[tokio::test]
async fn test_transient_listing_error_recovers() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1"]]).with_list_errors(
        0,
        2,
        ApiError::Transient("HTTP 502".to_string()),
    ));
    let sink = Arc::new(CountingSink::new());

    let summary = run_simple(
        fast_config(range()),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.transcribed, 1);
    assert_eq!(api.list_requests().len(), 3);
}

#[tokio::test]
async fn test_duplicate_ids_across_pages_are_processed_once() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["2", "3"]]));
    let sink = Arc::new(CountingSink::new());

    let summary = run_simple(
        fast_config(range()),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.transcribed, 3);
    assert_eq!(api.transcript_fetches("2"), 1);
    assert_eq!(sink.writes("2"), 1);
}

#[tokio::test]
async fn test_progress_bar_shows_current_page() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1"], &["2"], &["3"]]));
    let sink = Arc::new(CountingSink::new());
    let bar = ProgressBar::hidden();

    let summary = FetchExecutor::new(
        fast_config(range()),
        api.clone(),
        Box::new(MemoryProgressStore::new(range())),
        sink.clone(),
    )
    .unwrap()
    .with_shutdown(ShutdownCoordinator::shared())
    .with_progress_bar(bar.clone())
    .execute()
    .await
    .unwrap();

    assert_eq!(summary.pages, 3);
    assert_eq!(bar.position(), 3);
    assert_eq!(bar.message(), format!("{} page 3", range()));
}

#[tokio::test]
async fn test_title_filter_skips_non_matching_calls() {
    let mut demo = call("1");
    demo.title = "Product Demo with Acme".to_string();
    let mut standup = call("2");
    standup.title = "Daily standup".to_string();
    let mut sync = call("3");
    sync.title = "Weekly sync".to_string();
    let api = Arc::new(ScriptedApi::new(vec![vec![demo, standup, sync]]));
    let sink = Arc::new(CountingSink::new());

    let config = fast_config(range()).with_title_filter(TitleFilter::parse("demo"));
    let summary = run_simple(config, &api, MemoryProgressStore::new(range()), &sink)
        .await
        .unwrap();

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.filtered, 2);
    assert_eq!(summary.transcribed, 1);
    assert_eq!(api.total_transcript_fetches(), 1);
    assert_eq!(sink.persisted_ids(), vec!["1"]);
}

#[tokio::test]
async fn test_dry_run_only_lists() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]));
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();

    let summary = run_simple(fast_config(range()).with_dry_run(true), &api, store, &sink)
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.listed, 4);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.transcribed, 0);
    assert_eq!(api.total_transcript_fetches(), 0);
    assert_eq!(sink.total_writes(), 0);
    assert_eq!(sink.finish_calls(), 0);
    assert_eq!(inspect.events(), vec![StoreEvent::Loaded]);
}

#[tokio::test]
async fn test_call_without_transcript_is_not_fetched() {
    let mut silent = call("1");
    silent.transcript_available = false;
    let api = Arc::new(ScriptedApi::new(vec![vec![silent, call("2")]]));
    let sink = Arc::new(CountingSink::new());

    let summary = run_simple(
        fast_config(range()),
        &api,
        MemoryProgressStore::new(range()),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(summary.unavailable, 1);
    assert_eq!(summary.transcribed, 1);
    assert_eq!(api.transcript_fetches("1"), 0);
    assert_eq!(
        sink.record("1").unwrap().transcript,
        TranscriptOutcome::NotAvailable
    );
}

#[tokio::test]
async fn test_resume_starts_at_stored_cursor() {
    let mut checkpoint = ProgressCheckpoint::new(range());
    checkpoint.cursor = Some(Cursor::new("page-1"));
    checkpoint.mark_completed("3");
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]));
    let sink = Arc::new(CountingSink::new());

    let summary = run_simple(
        fast_config(range()),
        &api,
        MemoryProgressStore::with_checkpoint(checkpoint),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(api.list_requests(), vec![Some(Cursor::new("page-1"))]);
    assert_eq!(summary.listed, 2);
    assert_eq!(summary.already_completed, 1);
    assert_eq!(summary.transcribed, 1);
    assert_eq!(sink.persisted_ids(), vec!["4"]);
}

#[tokio::test]
async fn test_cursor_advances_after_page_is_complete() {
    let api = Arc::new(ScriptedApi::with_ids(&[&["1", "2"], &["3", "4"]]));
    let sink = Arc::new(CountingSink::new());
    let store = MemoryProgressStore::new(range());
    let inspect = store.handle();

    run_simple(fast_config(range()), &api, store, &sink)
        .await
        .unwrap();

    let events = inspect.events();
    let position = |event: StoreEvent| events.iter().position(|e| *e == event).unwrap();
    let advanced = position(StoreEvent::CursorAdvanced(Cursor::new("page-1")));
    assert!(position(StoreEvent::Completed("1".to_string())) < advanced);
    assert!(position(StoreEvent::Completed("2".to_string())) < advanced);
    assert!(position(StoreEvent::Completed("3".to_string())) > advanced);
    assert!(position(StoreEvent::Completed("4".to_string())) > advanced);
    assert_eq!(events.first(), Some(&StoreEvent::Loaded));
    assert_eq!(events.last(), Some(&StoreEvent::Cleared));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let api = Arc::new(ScriptedApi::default());
    let sink = Arc::new(CountingSink::new());
    let result = FetchExecutor::new(
        fast_config(range()).with_concurrency(0),
        api,
        Box::new(MemoryProgressStore::new(range())),
        sink,
    );
    assert!(matches!(result, Err(DownloadError::InvalidConfig(_))));
}
