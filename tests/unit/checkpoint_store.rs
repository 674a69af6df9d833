//! FileProgressStore and checkpoint verification

use tempfile::TempDir;
use transcript_downloader::resume::state::MAX_STATE_FILE_SIZE;
use transcript_downloader::resume::{
    verify_dir, CheckpointEnvelope, FileProgressStore, ProgressCheckpoint, ProgressStore,
    ResumeError,
};
use transcript_downloader::{Cursor, DateRange};

fn range() -> DateRange {
    DateRange::parse("2023-01-01", "2023-01-02").unwrap()
}

#[test]
fn test_checkpoint_file_is_versioned_json() {
    let dir = TempDir::new().unwrap();
    let mut store = FileProgressStore::open(dir.path(), range()).unwrap();
    store.record_completed("42").unwrap();
    store.advance_cursor(&Cursor::new("abc")).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["schema_version"], "1.0.0");
    assert_eq!(raw["checkpoint"]["cursor"], "abc");
    assert_eq!(raw["checkpoint"]["completed"][0], "42");
    assert_eq!(raw["checkpoint"]["range"]["start"], "2023-01-01");
}

#[test]
fn test_run_lock_released_on_drop() {
    let dir = TempDir::new().unwrap();
    let first = FileProgressStore::open(dir.path(), range()).unwrap();
    assert!(matches!(
        FileProgressStore::open(dir.path(), range()),
        Err(ResumeError::LockError(_))
    ));
    drop(first);
    assert!(FileProgressStore::open(dir.path(), range()).is_ok());
}

#[test]
fn test_ranges_use_separate_files() {
    let dir = TempDir::new().unwrap();
    let other = DateRange::parse("2023-02-01", "2023-02-28").unwrap();
    let mut a = FileProgressStore::open(dir.path(), range()).unwrap();
    let mut b = FileProgressStore::open(dir.path(), other).unwrap();
    a.record_completed("1").unwrap();
    b.record_completed("2").unwrap();

    assert_ne!(a.path(), b.path());
    assert!(a.load().unwrap().unwrap().is_completed("1"));
    assert!(!b.load().unwrap().unwrap().is_completed("1"));
}

#[test]
fn test_corrupt_checkpoint_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = FileProgressStore::path_for(dir.path(), &range());
    std::fs::write(&path, "{ not json").unwrap();

    let mut store = FileProgressStore::open(dir.path(), range()).unwrap();
    assert!(matches!(
        store.load(),
        Err(ResumeError::DeserializationError(_))
    ));
}

#[test]
fn test_verify_dir_reports_each_file() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = FileProgressStore::open(dir.path(), range()).unwrap();
        store.record_completed("1").unwrap();
    }
    let broken = DateRange::parse("2024-01-01", "2024-01-02").unwrap();
    std::fs::write(FileProgressStore::path_for(dir.path(), &broken), "[]").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let results = verify_dir(dir.path()).unwrap();
    assert_eq!(results.len(), 2);
    let checkpoint = results[0].1.as_ref().unwrap();
    assert_eq!(checkpoint.range, range());
    assert!(checkpoint.is_completed("1"));
    assert!(results[1].1.is_err());
}

#[test]
fn test_verify_missing_dir_is_empty() {
    let dir = TempDir::new().unwrap();
    assert!(verify_dir(dir.path().join("absent")).unwrap().is_empty());
}

/// Checkpoint whose encoded envelope is a few bytes under the size limit
fn checkpoint_just_under_limit() -> ProgressCheckpoint {
    let mut checkpoint = ProgressCheckpoint::new(range());
    checkpoint.completed = (0..400_000u64).map(|i| format!("{i:019}")).collect();
    let base = serde_json::to_vec(&CheckpointEnvelope::new(checkpoint.clone()))
        .unwrap()
        .len() as u64;
    // Replacing `null` with the quoted padding lands 10 bytes under the limit
    let padding = MAX_STATE_FILE_SIZE - base - 8;
    checkpoint.cursor = Some(Cursor::new("x".repeat(padding as usize)));
    checkpoint
}

#[test]
fn test_checkpoint_near_size_limit_stays_loadable() {
    let dir = TempDir::new().unwrap();
    let path = FileProgressStore::path_for(dir.path(), &range());
    let seeded = checkpoint_just_under_limit();
    CheckpointEnvelope::new(seeded.clone()).save(&path).unwrap();
    let size = std::fs::metadata(&path).unwrap().len();
    assert!(size <= MAX_STATE_FILE_SIZE);
    assert!(size > MAX_STATE_FILE_SIZE - 32);

    let mut store = FileProgressStore::open(dir.path(), range()).unwrap();
    assert_eq!(store.load().unwrap(), Some(seeded.clone()));

    // One more id would push the file past the limit
    let err = store.record_completed("9999999999999999999").unwrap_err();
    assert!(matches!(err, ResumeError::StateTooLarge { .. }));
    drop(store);

    let mut reopened = FileProgressStore::open(dir.path(), range()).unwrap();
    let checkpoint = reopened.load().unwrap().unwrap();
    assert_eq!(checkpoint, seeded);
    assert!(std::fs::metadata(&path).unwrap().len() <= MAX_STATE_FILE_SIZE);
}
