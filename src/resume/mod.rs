//! Resume capability for fetch jobs
//!
//! A [`ProgressStore`] remembers the pagination cursor, every call id
//! whose data has been durably written and every call id that gave up, so
//! an interrupted run restarts where it stopped and still reports earlier
//! failures. [`FileProgressStore`] persists with atomic writes and file
//! locking; [`MemoryProgressStore`] keeps state in process.

use crate::Cursor;

pub mod checkpoint;
pub mod lock;
pub mod memory;
pub mod state;

pub use checkpoint::ProgressCheckpoint;
pub use lock::RunLock;
pub use memory::{MemoryProgressStore, MemoryStoreHandle, StoreEvent};
pub use state::{verify_dir, CheckpointEnvelope, FileProgressStore, ResumeError};

/// Durable record of job progress.
///
/// Mutations are durable before they return. The orchestrator owns the
/// store through a single writer task, hence `&mut self`.
pub trait ProgressStore: Send {
    /// Last persisted checkpoint, if any
    fn load(&mut self) -> Result<Option<ProgressCheckpoint>, ResumeError>;

    /// Add `id` to the completed set; re-recording is a no-op success
    fn record_completed(&mut self, id: &str) -> Result<(), ResumeError>;

    /// Remember that `id` exhausted its retries without being persisted
    fn record_failed(&mut self, id: &str) -> Result<(), ResumeError>;

    /// Persist the cursor of the next page to list
    fn advance_cursor(&mut self, cursor: &Cursor) -> Result<(), ResumeError>;

    /// Remove the checkpoint once the job is done
    fn clear(&mut self) -> Result<(), ResumeError>;
}
