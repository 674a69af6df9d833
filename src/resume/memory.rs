//! In-process progress store
//!
//! Used when resume is disabled and by tests. The [`MemoryStoreHandle`]
//! stays with the caller after the store moves into the writer task and
//! shows what the store saw.

use super::checkpoint::ProgressCheckpoint;
use super::state::ResumeError;
use super::ProgressStore;
use crate::{Cursor, DateRange};
use std::sync::{Arc, Mutex, MutexGuard};

/// One store operation, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// `load` was called
    Loaded,
    /// An id was newly recorded
    Completed(String),
    /// An id was newly recorded as failed
    Failed(String),
    /// The cursor moved
    CursorAdvanced(Cursor),
    /// The checkpoint was cleared
    Cleared,
}

#[derive(Debug, Default)]
struct Inner {
    current: Option<ProgressCheckpoint>,
    cleared: Option<ProgressCheckpoint>,
    events: Vec<StoreEvent>,
    fail_writes: bool,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Progress store kept in memory
#[derive(Debug)]
pub struct MemoryProgressStore {
    range: DateRange,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProgressStore {
    /// Empty store for `range`
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Store that starts from `checkpoint`, as if a previous run left it
    pub fn with_checkpoint(checkpoint: ProgressCheckpoint) -> Self {
        let store = Self::new(checkpoint.range);
        lock(&store.inner).current = Some(checkpoint);
        store
    }

    /// Inspection handle sharing this store's state
    pub fn handle(&self) -> MemoryStoreHandle {
        MemoryStoreHandle {
            inner: self.inner.clone(),
        }
    }

    fn write(&mut self) -> Result<MutexGuard<'_, Inner>, ResumeError> {
        let inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(ResumeError::IoError("simulated write failure".to_string()));
        }
        Ok(inner)
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&mut self) -> Result<Option<ProgressCheckpoint>, ResumeError> {
        let mut inner = lock(&self.inner);
        inner.events.push(StoreEvent::Loaded);
        Ok(inner.current.clone())
    }

    fn record_completed(&mut self, id: &str) -> Result<(), ResumeError> {
        let range = self.range;
        let mut guard = self.write()?;
        let inner = &mut *guard;
        let checkpoint = inner
            .current
            .get_or_insert_with(|| ProgressCheckpoint::new(range));
        if checkpoint.mark_completed(id) {
            inner.events.push(StoreEvent::Completed(id.to_string()));
        }
        Ok(())
    }

    fn record_failed(&mut self, id: &str) -> Result<(), ResumeError> {
        let range = self.range;
        let mut guard = self.write()?;
        let inner = &mut *guard;
        let checkpoint = inner
            .current
            .get_or_insert_with(|| ProgressCheckpoint::new(range));
        if checkpoint.mark_failed(id) {
            inner.events.push(StoreEvent::Failed(id.to_string()));
        }
        Ok(())
    }

    fn advance_cursor(&mut self, cursor: &Cursor) -> Result<(), ResumeError> {
        let range = self.range;
        let mut inner = self.write()?;
        inner
            .current
            .get_or_insert_with(|| ProgressCheckpoint::new(range))
            .cursor = Some(cursor.clone());
        inner.events.push(StoreEvent::CursorAdvanced(cursor.clone()));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), ResumeError> {
        let mut inner = self.write()?;
        let taken = inner.current.take();
        inner.cleared = taken;
        inner.events.push(StoreEvent::Cleared);
        Ok(())
    }
}

/// Read side of a [`MemoryProgressStore`]
#[derive(Debug, Clone)]
pub struct MemoryStoreHandle {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStoreHandle {
    /// Checkpoint as it stands now
    pub fn current(&self) -> Option<ProgressCheckpoint> {
        lock(&self.inner).current.clone()
    }

    /// Checkpoint as it was when last cleared
    pub fn last_cleared(&self) -> Option<ProgressCheckpoint> {
        lock(&self.inner).cleared.clone()
    }

    /// Every operation so far
    pub fn events(&self) -> Vec<StoreEvent> {
        lock(&self.inner).events.clone()
    }

    /// Make every later mutation fail
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }
}
