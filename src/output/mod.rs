//! Result sinks
//!
//! The orchestrator hands every completed [`CallRecord`] to a
//! [`ResultSink`] and only marks the call complete once `write` returns.
//! [`DirectorySink`] is the shipped implementation.

use crate::CallRecord;

pub mod csv;
pub mod directory;
pub mod layout;
pub mod listing;
pub mod participants;
pub mod text;

pub use directory::DirectorySink;
pub use layout::{safe_filename, OutputLayout};
pub use listing::{write_call_list, ListFormat};
pub use participants::{ParticipantLedger, ParticipantRecord};

/// Linux `ENOSPC`
const ENOSPC: i32 = 28;
/// Linux `EROFS`
const EROFS: i32 = 30;

/// Sink errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Worth retrying (interrupted write, transient IO)
    #[error("transient sink error: {0}")]
    Transient(String),

    /// Retrying cannot help (disk full, permission denied, read-only filesystem)
    #[error("fatal sink error: {0}")]
    Fatal(String),
}

impl SinkError {
    /// Classify an IO error raised while doing `context`
    pub fn from_io(err: std::io::Error, context: impl std::fmt::Display) -> Self {
        let message = format!("{context}: {err}");
        let fatal = matches!(err.raw_os_error(), Some(ENOSPC) | Some(EROFS))
            || err.kind() == std::io::ErrorKind::PermissionDenied;
        if fatal {
            Self::Fatal(message)
        } else {
            Self::Transient(message)
        }
    }
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for completed records
///
/// Calls are synchronous; the orchestrator runs them on the blocking pool.
pub trait ResultSink: Send + Sync {
    /// Persist one record; durable before returning
    fn write(&self, record: &CallRecord) -> SinkResult<()>;

    /// Whether `call_id` was persisted by an earlier run
    fn is_persisted(&self, _call_id: &str) -> bool {
        false
    }

    /// Called once after the last record of a completed job
    fn finish(&self) -> SinkResult<()> {
        Ok(())
    }
}

/// Which artifacts [`DirectorySink`] produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// `raw_json/call_{id}.json`
    pub raw_json: bool,
    /// `transcripts/` and `by_date/` text files, plus participant summaries
    pub formatted_text: bool,
    /// `calls_metadata.csv`, `participants.csv`, `summary_statistics.csv`
    pub metadata_csv: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            raw_json: true,
            formatted_text: true,
            metadata_csv: true,
        }
    }
}
