//! Job phases and the end-of-run summary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobPhase {
    /// Loading the checkpoint
    #[default]
    Resuming,
    /// Fetching a list page
    Listing,
    /// Fetching transcripts for the current page
    Detailing,
    /// Persisting the next cursor
    Advancing,
    /// Flushing outstanding checkpoint writes
    Draining,
    /// Every page processed and the checkpoint cleared
    Done,
    /// Halted; the checkpoint is kept for resume
    Failed,
}

impl JobPhase {
    /// Whether the job can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resuming => "resuming",
            Self::Listing => "listing",
            Self::Detailing => "detailing",
            Self::Advancing => "advancing",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a job that reached `Done`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobSummary {
    /// Calls returned by list pages in this run, duplicates excluded
    pub listed: u64,
    /// Calls persisted with a transcript
    pub transcribed: u64,
    /// Calls persisted without a transcript
    pub unavailable: u64,
    /// Calls whose transcript fetch or sink write gave up
    pub failed_ids: Vec<String>,
    /// Listed calls skipped because an earlier run completed them
    pub already_completed: u64,
    /// Listed calls dropped by the title filter
    pub filtered: u64,
    /// List pages fetched
    pub pages: u64,
    /// Whether this was a dry run
    pub dry_run: bool,
}

impl JobSummary {
    /// Calls persisted in this run
    pub fn persisted(&self) -> u64 {
        self.transcribed + self.unavailable
    }

    /// Whether every listed call ended up persisted
    pub fn is_clean(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} listed, {} transcribed, {} unavailable, {} failed, {} already completed, {} filtered over {} pages",
            self.listed,
            self.transcribed,
            self.unavailable,
            self.failed_ids.len(),
            self.already_completed,
            self.filtered,
            self.pages
        )
    }
}
