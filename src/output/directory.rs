//! Directory result sink
//!
//! Writes every call as raw JSON, formatted text and a metadata CSV row
//! under one job root. The raw JSON file is written last and marks the call
//! as persisted; on open the sink rescans those files to rebuild its state.

use super::csv::{
    read_metadata_rows, write_participants_csv, write_summary_csv, CallStat, MetadataCsvWriter,
    MetadataRow, SummaryStatistics,
};
use super::layout::{write_atomic, OutputLayout};
use super::participants::ParticipantLedger;
use super::text::{format_participant_summary, format_transcript_text};
use super::{OutputOptions, ResultSink, SinkError, SinkResult};
use crate::{CallRecord, CallSummary, DateRange, Transcript};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Contents of `raw_json/call_{id}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCallFile {
    /// Call metadata
    pub call_metadata: CallSummary,
    /// Transcript, `null` when the call has none
    pub transcript: Option<Transcript>,
}

#[derive(Serialize)]
struct RawCallFileRef<'a> {
    call_metadata: &'a CallSummary,
    transcript: Option<&'a Transcript>,
}

#[derive(Default)]
struct SinkState {
    persisted: HashSet<String>,
    calls: BTreeMap<String, CallStat>,
    ledger: ParticipantLedger,
    metadata: Option<MetadataCsvWriter>,
    metadata_ids: HashSet<String>,
}

impl SinkState {
    fn remember(&mut self, summary: &CallSummary, has_transcript: bool) {
        self.persisted.insert(summary.id.clone());
        self.calls
            .insert(summary.id.clone(), CallStat::new(summary, has_transcript));
        self.ledger.add_call(summary);
    }
}

/// [`ResultSink`] writing files under `{output}/{start_year}/`
pub struct DirectorySink {
    layout: OutputLayout,
    options: OutputOptions,
    state: Mutex<SinkState>,
}

impl DirectorySink {
    /// Open the sink for `range`, creating directories and rescanning earlier output
    pub fn open(
        output_dir: impl AsRef<Path>,
        range: &DateRange,
        options: OutputOptions,
    ) -> SinkResult<Self> {
        let layout = OutputLayout::new(output_dir, range);
        layout
            .create_dirs(&options)
            .map_err(|e| SinkError::from_io(e, format!("create {}", layout.root().display())))?;
        let state = rebuild(&layout, &options)?;
        info!(
            root = %layout.root().display(),
            persisted = state.persisted.len(),
            "Output directory ready"
        );
        Ok(Self {
            layout,
            options,
            state: Mutex::new(state),
        })
    }

    /// Paths this sink writes to
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Calls persisted so far, including earlier runs
    pub fn persisted_count(&self) -> usize {
        self.state().map(|s| s.persisted.len()).unwrap_or(0)
    }

    fn state(&self) -> SinkResult<MutexGuard<'_, SinkState>> {
        self.state
            .lock()
            .map_err(|_| SinkError::Fatal("sink state lock poisoned".to_string()))
    }
}

fn rebuild(layout: &OutputLayout, options: &OutputOptions) -> SinkResult<SinkState> {
    let mut state = SinkState::default();

    if options.raw_json {
        let entries = std::fs::read_dir(layout.raw_json_dir())
            .map_err(|e| SinkError::from_io(e, "scan raw_json"))?;
        for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
            let is_call_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("call_") && n.ends_with(".json"));
            if !is_call_file {
                continue;
            }
            let parsed = std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<RawCallFile>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(file) => state.remember(&file.call_metadata, file.transcript.is_some()),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Ignoring unreadable raw JSON file")
                }
            }
        }
    }

    if options.metadata_csv {
        for row in read_metadata_rows(&layout.metadata_csv())? {
            if !options.raw_json {
                state.persisted.insert(row.call_id.clone());
                state.calls.insert(
                    row.call_id.clone(),
                    CallStat {
                        date: row.date.clone(),
                        duration_minutes: row.duration_minutes,
                        has_transcript: row.has_transcript,
                    },
                );
            }
            state.metadata_ids.insert(row.call_id);
        }
    }

    Ok(state)
}

impl ResultSink for DirectorySink {
    fn write(&self, record: &CallRecord) -> SinkResult<()> {
        let mut state = self.state()?;
        let call = &record.summary;
        let date = call.date();

        if self.options.formatted_text {
            let text = format_transcript_text(record);
            for path in [
                self.layout.transcript_path(&call.id, &date),
                self.layout.by_date_path(&call.id, &date),
            ] {
                write_atomic(&path, text.as_bytes())
                    .map_err(|e| SinkError::from_io(e, path.display()))?;
            }
        }

        if self.options.metadata_csv && !state.metadata_ids.contains(&call.id) {
            if state.metadata.is_none() {
                state.metadata = Some(MetadataCsvWriter::open_append(&self.layout.metadata_csv())?);
            }
            if let Some(writer) = state.metadata.as_mut() {
                writer.write_row(&MetadataRow::from(record))?;
            }
            state.metadata_ids.insert(call.id.clone());
        }

        if self.options.raw_json {
            let path = self.layout.raw_json_path(&call.id);
            let body = serde_json::to_vec_pretty(&RawCallFileRef {
                call_metadata: call,
                transcript: record.transcript.transcript(),
            })
            .map_err(|e| SinkError::Fatal(format!("serialize call {}: {e}", call.id)))?;
            write_atomic(&path, &body).map_err(|e| SinkError::from_io(e, path.display()))?;
        }

        state.remember(call, record.transcript.transcript().is_some());
        debug!(call_id = %call.id, "Call persisted");
        Ok(())
    }

    fn is_persisted(&self, call_id: &str) -> bool {
        self.state()
            .map(|s| s.persisted.contains(call_id))
            .unwrap_or(false)
    }

    fn finish(&self) -> SinkResult<()> {
        let state = self.state()?;

        if self.options.metadata_csv {
            write_participants_csv(&self.layout.participants_csv(), &state.ledger)?;
            let stats = SummaryStatistics::compute(state.calls.values(), &state.ledger);
            write_summary_csv(&self.layout.summary_csv(), &stats)?;
        }

        if self.options.formatted_text {
            for record in state.ledger.records() {
                let path = self.layout.participant_summary_path(&record.key);
                write_atomic(&path, format_participant_summary(record).as_bytes())
                    .map_err(|e| SinkError::from_io(e, path.display()))?;
            }
        }

        info!(
            root = %self.layout.root().display(),
            calls = state.calls.len(),
            participants = state.ledger.len(),
            "Output finalized"
        );
        Ok(())
    }
}
