//! Checkpoint contents

use crate::{Cursor, DateRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Progress of one job over one date range.
///
/// Every id in `completed` has its record durably written to the sink.
/// Ids in `failed` gave up on an earlier page; the cursor has moved past
/// them, so they are reported again when the job ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCheckpoint {
    /// Range the cursor sweeps
    pub range: DateRange,
    /// Next page to list; `None` means the first page
    #[serde(default)]
    pub cursor: Option<Cursor>,
    /// Ids fully fetched and persisted
    #[serde(default)]
    pub completed: BTreeSet<String>,
    /// Ids that exhausted their retries and were never persisted
    #[serde(default)]
    pub failed: BTreeSet<String>,
}

impl ProgressCheckpoint {
    /// Empty checkpoint for `range`
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            cursor: None,
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
        }
    }

    /// Whether `id` is already complete
    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    /// Add `id`, dropping any earlier failure; false if nothing changed
    pub fn mark_completed(&mut self, id: &str) -> bool {
        let was_failed = self.failed.remove(id);
        self.completed.insert(id.to_string()) || was_failed
    }

    /// Remember that `id` gave up; false if it is already known
    pub fn mark_failed(&mut self, id: &str) -> bool {
        if self.completed.contains(id) {
            return false;
        }
        self.failed.insert(id.to_string())
    }
}
