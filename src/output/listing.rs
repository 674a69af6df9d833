//! Call list export
//!
//! Writes `calls_list.csv`, `calls_list.json` or `calls_list.txt` directly
//! under the output directory.

use super::csv::write_whole;
use super::layout::write_atomic;
use super::{SinkError, SinkResult};
use crate::{CallSummary, DateRange, Participant};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File format for a call list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    /// One row per call
    #[default]
    Csv,
    /// The call summaries as a JSON array
    Json,
    /// Plain-text report
    Txt,
}

impl ListFormat {
    /// File extension, also the CLI spelling
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Txt => "txt",
        }
    }
}

impl FromStr for ListFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "txt" => Ok(Self::Txt),
            _ => Err(format!("Invalid list format: {s}. Valid options: csv, json, txt")),
        }
    }
}

impl fmt::Display for ListFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Serialize)]
struct CallListRow<'a> {
    id: &'a str,
    title: &'a str,
    started: String,
    duration_minutes: u64,
    direction: &'a str,
    participants: String,
}

fn participant_names(participants: &[Participant], separator: &str) -> String {
    participants
        .iter()
        .map(Participant::display_name)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Path of the call list for `format` under `dir`
pub fn call_list_path(dir: &Path, format: ListFormat) -> PathBuf {
    dir.join(format!("calls_list.{}", format.extension()))
}

/// Write `calls` to `{dir}/calls_list.{ext}`, replacing any earlier list
pub fn write_call_list(
    dir: &Path,
    range: &DateRange,
    calls: &[CallSummary],
    format: ListFormat,
) -> SinkResult<PathBuf> {
    let path = call_list_path(dir, format);
    match format {
        ListFormat::Csv => {
            let rows = calls.iter().map(|call| CallListRow {
                id: &call.id,
                title: &call.title,
                started: call.started.to_rfc3339(),
                duration_minutes: call.duration_secs / 60,
                direction: call.direction.as_deref().unwrap_or(""),
                participants: participant_names(&call.participants, "; "),
            });
            write_whole(&path, rows)?;
        }
        ListFormat::Json => {
            let json = serde_json::to_vec_pretty(calls)
                .map_err(|e| SinkError::Fatal(format!("encode call list: {e}")))?;
            write_atomic(&path, &json).map_err(|e| SinkError::from_io(e, path.display()))?;
        }
        ListFormat::Txt => {
            let text = format_call_list(range, calls);
            write_atomic(&path, text.as_bytes())
                .map_err(|e| SinkError::from_io(e, path.display()))?;
        }
    }
    Ok(path)
}

/// Plain-text call list
pub fn format_call_list(range: &DateRange, calls: &[CallSummary]) -> String {
    let mut out = format!("Calls List ({} to {})\n", range.start, range.end);
    out.push_str(&"=".repeat(80));
    out.push_str("\n\n");
    for call in calls {
        let title = if call.title.is_empty() { "N/A" } else { &call.title };
        out.push_str(&format!("ID: {}\n", call.id));
        out.push_str(&format!("Title: {title}\n"));
        out.push_str(&format!("Date: {}\n", call.started.to_rfc3339()));
        out.push_str(&format!("Duration: {} minutes\n", call.duration_secs / 60));
        out.push_str(&format!(
            "Participants: {}\n",
            participant_names(&call.participants, ", ")
        ));
        out.push_str(&"-".repeat(40));
        out.push('\n');
    }
    out
}
