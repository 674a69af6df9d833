//! CSV outputs
//!
//! `calls_metadata.csv` grows one synced row per call. `participants.csv`
//! and `summary_statistics.csv` are rewritten whole at the end of a job.

use super::layout::write_atomic;
use super::participants::ParticipantLedger;
use super::{SinkError, SinkResult};
use crate::{CallRecord, CallSummary, ParticipantContext};
use csv::{Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_BUFFER_SIZE: usize = 8192;

fn csv_error(err: csv::Error, context: &str) -> SinkError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => SinkError::from_io(io, context),
        other => SinkError::Fatal(format!("{context}: {other:?}")),
    }
}

fn joined<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join("; ")
}

/// One row of `calls_metadata.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    /// Call id
    pub call_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM` UTC
    pub time: String,
    /// Whole minutes
    pub duration_minutes: u64,
    /// Title
    pub title: String,
    /// Direction
    pub direction: String,
    /// Whether a transcript was retrieved
    pub has_transcript: bool,
    /// Utterances in the transcript
    pub utterance_count: usize,
    /// Meeting link
    pub meeting_url: String,
    /// Every participant, `; `-separated
    pub all_participants: String,
    /// Internal participants
    pub internal_participants: String,
    /// External participants
    pub external_participants: String,
    /// Participant count
    pub participant_count: usize,
    /// Internal participant count
    pub internal_count: usize,
    /// External participant count
    pub external_count: usize,
}

impl From<&CallRecord> for MetadataRow {
    fn from(record: &CallRecord) -> Self {
        let call = &record.summary;
        let with_context = |context: ParticipantContext| {
            call.participants
                .iter()
                .filter(move |p| p.context == context)
                .map(|p| p.display_name())
        };
        let transcript = record.transcript.transcript();

        Self {
            call_id: call.id.clone(),
            date: call.date(),
            time: call.time_of_day(),
            duration_minutes: call.duration_minutes(),
            title: call.title.clone(),
            direction: call.direction.clone().unwrap_or_default(),
            has_transcript: transcript.is_some(),
            utterance_count: transcript.map_or(0, |t| t.utterances.len()),
            meeting_url: call.meeting_url.clone().unwrap_or_default(),
            all_participants: joined(call.participants.iter().map(|p| p.display_name())),
            internal_participants: joined(with_context(ParticipantContext::Internal)),
            external_participants: joined(with_context(ParticipantContext::External)),
            participant_count: call.participants.len(),
            internal_count: with_context(ParticipantContext::Internal).count(),
            external_count: with_context(ParticipantContext::External).count(),
        }
    }
}

/// Appending writer for `calls_metadata.csv`
pub struct MetadataCsvWriter {
    writer: Writer<BufWriter<File>>,
    rows_written: u64,
}

impl MetadataCsvWriter {
    /// Open for append; the header is written only into an empty file
    pub fn open_append(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SinkError::from_io(e, "create metadata directory"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SinkError::from_io(e, "open calls_metadata.csv"))?;
        let is_empty = file
            .metadata()
            .map_err(|e| SinkError::from_io(e, "stat calls_metadata.csv"))?
            .len()
            == 0;

        debug!(path = %path.display(), new_file = is_empty, "Opened metadata CSV");
        let writer = WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    /// Append a row and sync it to disk
    pub fn write_row(&mut self, row: &MetadataRow) -> SinkResult<()> {
        self.writer
            .serialize(row)
            .map_err(|e| csv_error(e, "write metadata row"))?;
        self.writer
            .flush()
            .map_err(|e| SinkError::from_io(e, "flush calls_metadata.csv"))?;
        self.writer
            .get_ref()
            .get_ref()
            .sync_data()
            .map_err(|e| SinkError::from_io(e, "sync calls_metadata.csv"))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Rows appended through this writer
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

/// Read back every row of an existing metadata CSV
pub fn read_metadata_rows(path: &Path) -> SinkResult<Vec<MetadataRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(e, "open metadata CSV"))?;
    // Torn rows from an interrupted append are skipped.
    Ok(reader.deserialize().filter_map(Result::ok).collect())
}

/// Per-call facts kept for `summary_statistics.csv`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStat {
    /// `YYYY-MM-DD`
    pub date: String,
    /// Whole minutes
    pub duration_minutes: u64,
    /// Whether a transcript was retrieved
    pub has_transcript: bool,
}

impl CallStat {
    /// Facts about `call`
    pub fn new(call: &CallSummary, has_transcript: bool) -> Self {
        Self {
            date: call.date(),
            duration_minutes: call.duration_minutes(),
            has_transcript,
        }
    }
}

/// The single row of `summary_statistics.csv`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    /// Calls persisted
    pub total_calls: u64,
    /// Calls with a transcript
    pub calls_with_transcripts: u64,
    /// Earliest call date
    pub date_range_start: String,
    /// Latest call date
    pub date_range_end: String,
    /// Sum of durations
    pub total_duration_minutes: u64,
    /// Mean duration
    pub average_duration_minutes: f64,
    /// Distinct internal participants
    pub unique_internal_participants: usize,
    /// Distinct external participants
    pub unique_external_participants: usize,
}

impl SummaryStatistics {
    /// Aggregate over persisted calls and the participant ledger
    pub fn compute<'a>(
        calls: impl IntoIterator<Item = &'a CallStat>,
        ledger: &ParticipantLedger,
    ) -> Self {
        let mut stats = Self {
            total_calls: 0,
            calls_with_transcripts: 0,
            date_range_start: String::new(),
            date_range_end: String::new(),
            total_duration_minutes: 0,
            average_duration_minutes: 0.0,
            unique_internal_participants: 0,
            unique_external_participants: 0,
        };
        for call in calls {
            stats.total_calls += 1;
            stats.calls_with_transcripts += u64::from(call.has_transcript);
            stats.total_duration_minutes += call.duration_minutes;
            if stats.date_range_start.is_empty() || call.date < stats.date_range_start {
                stats.date_range_start = call.date.clone();
            }
            if call.date > stats.date_range_end {
                stats.date_range_end = call.date.clone();
            }
        }
        if stats.total_calls > 0 {
            stats.average_duration_minutes =
                stats.total_duration_minutes as f64 / stats.total_calls as f64;
        }
        for record in ledger.records() {
            match record.context {
                ParticipantContext::Internal => stats.unique_internal_participants += 1,
                ParticipantContext::External => stats.unique_external_participants += 1,
                ParticipantContext::Unknown => {}
            }
        }
        stats
    }
}

#[derive(Serialize)]
struct ParticipantRow<'a> {
    participant_key: &'a str,
    name: &'a str,
    email: &'a str,
    context: &'static str,
    company: &'a str,
    title: &'a str,
    speaker_id: &'a str,
    total_calls: u64,
    total_duration_minutes: u64,
    average_duration_minutes: f64,
    is_host_count: u64,
    is_organizer_count: u64,
    first_seen: &'a str,
    last_seen: &'a str,
    call_ids: String,
    call_dates: String,
}

pub(crate) fn write_whole<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> SinkResult<usize> {
    let mut writer = Writer::from_writer(Vec::new());
    let mut count = 0;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| csv_error(e, "serialize CSV row"))?;
        count += 1;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| SinkError::Fatal(format!("finish CSV buffer: {e}")))?;
    write_atomic(path, &bytes).map_err(|e| SinkError::from_io(e, path.display()))?;
    Ok(count)
}

/// Rewrite `participants.csv` from the ledger
pub fn write_participants_csv(path: &Path, ledger: &ParticipantLedger) -> SinkResult<()> {
    let rows = ledger.records().map(|r| ParticipantRow {
        participant_key: &r.key,
        name: &r.name,
        email: &r.email,
        context: r.context.as_str(),
        company: &r.company,
        title: &r.title,
        speaker_id: &r.speaker_id,
        total_calls: r.total_calls,
        total_duration_minutes: r.total_duration_minutes,
        average_duration_minutes: r.average_duration_minutes(),
        is_host_count: r.is_host_count,
        is_organizer_count: r.is_organizer_count,
        first_seen: &r.first_seen,
        last_seen: &r.last_seen,
        call_ids: r.call_ids.join("; "),
        call_dates: r
            .call_dates
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; "),
    });
    let count = write_whole(path, rows)?;
    info!(path = %path.display(), participants = count, "Participant ledger written");
    Ok(())
}

/// Rewrite `summary_statistics.csv`
pub fn write_summary_csv(path: &Path, stats: &SummaryStatistics) -> SinkResult<()> {
    write_whole(path, [stats])?;
    Ok(())
}
