//! File-backed progress store
//!
//! One JSON envelope per date range. Every mutation rewrites the whole file
//! through a temp file that is synced and atomically renamed over the old
//! one, so a crash leaves either the previous or the new state on disk.

use super::checkpoint::ProgressCheckpoint;
use super::lock::{open_lock_file, sidecar_path, RunLock};
use super::ProgressStore;
use crate::metrics;
use crate::{Cursor, DateRange};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed checkpoint file size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

const FILE_PREFIX: &str = "checkpoint_";

/// On-disk wrapper around a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    schema_version: String,
    checkpoint: ProgressCheckpoint,
    created_at: i64,
    updated_at: i64,
}

impl CheckpointEnvelope {
    /// Wrap a fresh checkpoint
    pub fn new(checkpoint: ProgressCheckpoint) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            checkpoint,
            created_at: now,
            updated_at: now,
        }
    }

    /// Wrapped checkpoint
    pub fn checkpoint(&self) -> &ProgressCheckpoint {
        &self.checkpoint
    }

    /// Creation time in Unix milliseconds
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Last update time in Unix milliseconds
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Save to `path` with atomic write under the checkpoint write lock.
    ///
    /// Fails with [`ResumeError::StateTooLarge`] before touching the file
    /// when the encoded checkpoint is over [`MAX_STATE_FILE_SIZE`].
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        debug!(
            path = %path.display(),
            completed = self.checkpoint.completed.len(),
            "Saving checkpoint"
        );

        let json = self.encode()?;

        let lock_file = open_lock_file(&sidecar_path(path, "lock"))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(&json)
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        sync_dir(parent_dir);
        Ok(())
    }

    /// Compact JSON bytes, refused when `load` would reject them
    fn encode(&self) -> Result<Vec<u8>, ResumeError> {
        let json =
            serde_json::to_vec(self).map_err(|e| ResumeError::SerializationError(e.to_string()))?;
        let size = json.len() as u64;
        if size > MAX_STATE_FILE_SIZE {
            warn!(
                size,
                max = MAX_STATE_FILE_SIZE,
                completed = self.checkpoint.completed.len(),
                "Checkpoint would exceed the size limit, keeping the previous file"
            );
            return Err(ResumeError::StateTooLarge {
                size,
                max: MAX_STATE_FILE_SIZE,
            });
        }
        Ok(json)
    }

    /// Load from `path` under the checkpoint read lock.
    ///
    /// `Ok(None)` when no checkpoint exists.
    pub fn load(path: &Path) -> Result<Option<Self>, ResumeError> {
        if !path.exists() {
            return Ok(None);
        }

        let lock_file = open_lock_file(&sidecar_path(path, "lock"))?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ResumeError::IoError(e.to_string())),
        };
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let envelope: CheckpointEnvelope = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, path = %path.display(), "Failed to deserialize checkpoint");
            ResumeError::DeserializationError(e.to_string())
        })?;

        if envelope.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %envelope.schema_version,
                expected_version = SCHEMA_VERSION,
                "Checkpoint schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: envelope.schema_version,
            });
        }

        Ok(Some(envelope))
    }
}

fn sync_dir(dir: &Path) {
    if let Ok(dir) = std::fs::File::open(dir) {
        let _ = dir.sync_all();
    }
}

/// Checkpoint file for one range, held exclusively for the store's lifetime
#[derive(Debug)]
pub struct FileProgressStore {
    path: PathBuf,
    range: DateRange,
    envelope: Option<CheckpointEnvelope>,
    _run_lock: RunLock,
}

impl FileProgressStore {
    /// Open the store for `range` under `dir`, taking the run lock
    pub fn open(dir: impl AsRef<Path>, range: DateRange) -> Result<Self, ResumeError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            ResumeError::IoError(format!("Failed to create {}: {e}", dir.display()))
        })?;
        let path = Self::path_for(dir, &range);
        let run_lock = RunLock::try_acquire(&sidecar_path(&path, "run.lock"))?;
        Ok(Self {
            path,
            range,
            envelope: None,
            _run_lock: run_lock,
        })
    }

    /// Checkpoint file for `range` under `dir`
    pub fn path_for(dir: &Path, range: &DateRange) -> PathBuf {
        dir.join(format!("{FILE_PREFIX}{}_{}.json", range.start, range.end))
    }

    /// Checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(
        &mut self,
        kind: &'static str,
        apply: impl FnOnce(&mut ProgressCheckpoint) -> bool,
    ) -> Result<(), ResumeError> {
        let mut next = self
            .envelope
            .clone()
            .unwrap_or_else(|| CheckpointEnvelope::new(ProgressCheckpoint::new(self.range)));
        if !apply(&mut next.checkpoint) {
            return Ok(());
        }
        next.updated_at = chrono::Utc::now().timestamp_millis();
        next.save(&self.path)?;
        // Only adopt the new state once it is on disk.
        self.envelope = Some(next);
        metrics::record_checkpoint_write(kind);
        Ok(())
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&mut self) -> Result<Option<ProgressCheckpoint>, ResumeError> {
        self.envelope = CheckpointEnvelope::load(&self.path)?;
        if let Some(envelope) = &self.envelope {
            info!(
                path = %self.path.display(),
                completed = envelope.checkpoint.completed.len(),
                has_cursor = envelope.checkpoint.cursor.is_some(),
                "Checkpoint loaded"
            );
        }
        Ok(self.envelope.as_ref().map(|e| e.checkpoint.clone()))
    }

    fn record_completed(&mut self, id: &str) -> Result<(), ResumeError> {
        self.mutate("completed", |checkpoint| checkpoint.mark_completed(id))
    }

    fn record_failed(&mut self, id: &str) -> Result<(), ResumeError> {
        self.mutate("failed", |checkpoint| checkpoint.mark_failed(id))
    }

    fn advance_cursor(&mut self, cursor: &Cursor) -> Result<(), ResumeError> {
        self.mutate("cursor", |checkpoint| {
            if checkpoint.cursor.as_ref() == Some(cursor) {
                return false;
            }
            checkpoint.cursor = Some(cursor.clone());
            true
        })
    }

    fn clear(&mut self) -> Result<(), ResumeError> {
        let lock_file = open_lock_file(&sidecar_path(&self.path, "lock"))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ResumeError::IoError(format!("Failed to remove checkpoint: {e}"))),
        }
        if let Some(parent) = self.path.parent() {
            sync_dir(parent);
        }
        self.envelope = None;
        metrics::record_checkpoint_write("clear");
        info!(path = %self.path.display(), "Checkpoint cleared");
        Ok(())
    }
}

/// Load every checkpoint file under `dir`.
///
/// Each entry carries its own result so one corrupt file does not hide the
/// others. A missing directory yields an empty list.
pub fn verify_dir(
    dir: impl AsRef<Path>,
) -> Result<Vec<(PathBuf, Result<ProgressCheckpoint, ResumeError>)>, ResumeError> {
    let dir = dir.as_ref();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ResumeError::IoError(e.to_string())),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
        })
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let result = CheckpointEnvelope::load(&path).and_then(|envelope| {
                envelope
                    .map(|e| e.checkpoint)
                    .ok_or_else(|| ResumeError::IoError("checkpoint disappeared".to_string()))
            });
            (path, result)
        })
        .collect())
}

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
