//! # Transcript Downloader Library
//!
//! Bulk, resumable download of call transcripts from the Gong API under a
//! strict request-rate budget.
//!
//! ## Features
//!
//! - **Rate Limiting**: one leaky-bucket budget shared by listing and transcript requests
//! - **Retry Classification**: transient, rate-limited and fatal errors each have one rule
//! - **Resume Capability**: crash-consistent checkpoint of the cursor and completed calls
//! - **Bounded Concurrency**: transcript fetches fan out to a configurable worker pool
//! - **Pluggable Output**: any [`output::ResultSink`]; [`output::DirectorySink`] ships JSON, text and CSV
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use transcript_downloader::credentials::EnvCredentials;
//! use transcript_downloader::downloader::{run, FetchConfig};
//! use transcript_downloader::output::{DirectorySink, OutputOptions};
//! use transcript_downloader::DateRange;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = DateRange::parse("2023-01-01", "2023-01-31")?;
//! let sink = DirectorySink::open("./transcripts", &range, OutputOptions::default())?;
//! let config = FetchConfig::new(range).with_checkpoint_dir("./transcripts/.resume");
//!
//! let summary = run(config, &EnvCredentials, Arc::new(sink)).await?;
//! println!("{} transcripts downloaded", summary.transcribed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`credentials`] - Credential supplier and subdomain normalization
//! - [`fetcher`] - API trait, Gong HTTP client, error classification and retry driver
//! - [`downloader`] - Rate limiter, configuration and the fetch orchestrator
//! - [`resume`] - Progress stores (file-backed and in-memory)
//! - [`output`] - Result sink trait and the directory sink
//! - [`filter`] - Call title filtering

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Credential supplier for API access
pub mod credentials;

/// Fetch orchestration and rate limiting
pub mod downloader;

/// Remote API access
pub mod fetcher;

/// Call title filtering
pub mod filter;

/// Prometheus metrics
pub mod metrics;

/// Result sinks
pub mod output;

/// Resume capability for fetch jobs
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use downloader::{run, DownloadError, FetchConfig, JobSummary};

/// Inclusive range of calendar dates swept by a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting an end date before the start date
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err(format!("end date {end} is before start date {start}"));
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")
            .map_err(|e| format!("invalid start date '{start}': {e}"))?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")
            .map_err(|e| format!("invalid end date '{end}': {e}"))?;
        Self::new(start, end)
    }

    /// Inclusive lower bound as the API expects it
    pub fn from_datetime(&self) -> String {
        format!("{}T00:00:00Z", self.start.format("%Y-%m-%d"))
    }

    /// Exclusive upper bound: midnight after the last day
    pub fn to_datetime(&self) -> String {
        let next_day = self.end.checked_add_days(Days::new(1)).unwrap_or(self.end);
        format!("{}T00:00:00Z", next_day.format("%Y-%m-%d"))
    }

    /// Whether a call start time falls inside the range
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        let day = at.date_naive();
        day >= self.start && day <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Opaque pagination token returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the conversation a participant belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ParticipantContext {
    /// Member of the account's own organization
    Internal,
    /// Customer, prospect or other outside party
    External,
    /// Not reported by the API
    #[default]
    Unknown,
}

impl ParticipantContext {
    /// Parse the API's affiliation string; anything unrecognized is `Unknown`
    pub fn from_api(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("internal") => Self::Internal,
            Some("external") => Self::External,
            _ => Self::Unknown,
        }
    }

    /// Label used in CSV and text output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "Internal",
            Self::External => "External",
            Self::Unknown => "",
        }
    }
}

/// A party on a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Participant {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Internal or external
    #[serde(default)]
    pub context: ParticipantContext,
    /// Speaker reference used by transcript utterances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    /// Job title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Company name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Whether the participant hosted the call
    #[serde(default)]
    pub is_host: bool,
    /// Whether the participant organized the call
    #[serde(default)]
    pub is_organizer: bool,
}

impl Participant {
    /// Name if present, else email, else `"Unknown"`
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.email.as_deref().filter(|e| !e.trim().is_empty()))
            .unwrap_or("Unknown")
    }
}

/// Call metadata produced by a list page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSummary {
    /// Unique, stable call identifier
    pub id: String,
    /// Start time
    pub started: DateTime<Utc>,
    /// Duration in seconds
    pub duration_secs: u64,
    /// Call title
    #[serde(default)]
    pub title: String,
    /// Inbound, Outbound, Conference, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Meeting link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_url: Option<String>,
    /// Parties in API order
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// False when the call is known to have no transcript
    #[serde(default = "default_true")]
    pub transcript_available: bool,
}

fn default_true() -> bool {
    true
}

impl CallSummary {
    /// Start date as `YYYY-MM-DD`
    pub fn date(&self) -> String {
        self.started.format("%Y-%m-%d").to_string()
    }

    /// Start time of day as `HH:MM`
    pub fn time_of_day(&self) -> String {
        self.started.format("%H:%M").to_string()
    }

    /// Whole minutes
    pub fn duration_minutes(&self) -> u64 {
        self.duration_secs / 60
    }
}

/// One sentence spoken on a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Speaker reference, matches [`Participant::speaker_id`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    /// Topic label assigned by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Offset from call start in milliseconds
    pub start_ms: u64,
    /// End offset in milliseconds
    pub end_ms: u64,
    /// Spoken text
    pub text: String,
}

/// Ordered transcript of a single call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Call this transcript belongs to
    pub call_id: String,
    /// Utterances in spoken order
    pub utterances: Vec<Utterance>,
}

/// Result of asking for a call's transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptOutcome {
    /// The call was transcribed
    Available(Transcript),
    /// The call has no transcript; a normal outcome, not an error
    NotAvailable,
}

impl TranscriptOutcome {
    /// Borrow the transcript if there is one
    pub fn transcript(&self) -> Option<&Transcript> {
        match self {
            Self::Available(t) => Some(t),
            Self::NotAvailable => None,
        }
    }
}

/// A completed unit of work handed to the result sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Call metadata
    pub summary: CallSummary,
    /// Transcript, if the call has one
    pub transcript: TranscriptOutcome,
}
