//! Directory layout of downloaded output
//!
//! Everything for one job lives under `{output}/{start_year}/`:
//!
//! ```text
//! 2023/
//!   raw_json/call_{id}.json
//!   transcripts/transcript_{id}_{date}.txt
//!   by_date/{date}/transcript_{id}_{date}.txt
//!   by_participant/{key}/summary.txt
//!   calls_metadata.csv
//!   participants.csv
//!   summary_statistics.csv
//! ```

use super::OutputOptions;
use crate::DateRange;
use chrono::Datelike;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Longest file name stem produced by [`safe_filename`]
pub const MAX_FILENAME_CHARS: usize = 200;

/// Replace characters that are unsafe in file names and bound the length
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_CHARS)
        .collect()
}

/// Paths of every artifact for one job
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Layout for `range` under `output_dir`
    pub fn new(output_dir: impl AsRef<Path>, range: &DateRange) -> Self {
        Self {
            root: output_dir.as_ref().join(range.start.year().to_string()),
        }
    }

    /// Job root, `{output}/{start_year}`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw JSON directory
    pub fn raw_json_dir(&self) -> PathBuf {
        self.root.join("raw_json")
    }

    /// Raw JSON file of one call
    pub fn raw_json_path(&self, call_id: &str) -> PathBuf {
        self.raw_json_dir()
            .join(format!("{}.json", safe_filename(&format!("call_{call_id}"))))
    }

    /// Formatted transcript file name, without directory
    pub fn transcript_file_name(call_id: &str, date: &str) -> String {
        format!("{}.txt", safe_filename(&format!("transcript_{call_id}_{date}")))
    }

    /// Formatted transcript under `transcripts/`
    pub fn transcript_path(&self, call_id: &str, date: &str) -> PathBuf {
        self.root
            .join("transcripts")
            .join(Self::transcript_file_name(call_id, date))
    }

    /// Formatted transcript under `by_date/{date}/`
    pub fn by_date_path(&self, call_id: &str, date: &str) -> PathBuf {
        self.root
            .join("by_date")
            .join(safe_filename(date))
            .join(Self::transcript_file_name(call_id, date))
    }

    /// Summary of one participant
    pub fn participant_summary_path(&self, key: &str) -> PathBuf {
        self.root
            .join("by_participant")
            .join(safe_filename(key))
            .join("summary.txt")
    }

    /// Per-call metadata CSV
    pub fn metadata_csv(&self) -> PathBuf {
        self.root.join("calls_metadata.csv")
    }

    /// Participant ledger CSV
    pub fn participants_csv(&self) -> PathBuf {
        self.root.join("participants.csv")
    }

    /// Job statistics CSV
    pub fn summary_csv(&self) -> PathBuf {
        self.root.join("summary_statistics.csv")
    }

    /// Create the directories `options` needs
    pub fn create_dirs(&self, options: &OutputOptions) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        if options.raw_json {
            std::fs::create_dir_all(self.raw_json_dir())?;
        }
        if options.formatted_text {
            std::fs::create_dir_all(self.root.join("transcripts"))?;
            std::fs::create_dir_all(self.root.join("by_date"))?;
            std::fs::create_dir_all(self.root.join("by_participant"))?;
        }
        Ok(())
    }
}

/// Write `contents` to `path` through a synced temp file and atomic rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    if let Ok(dir) = std::fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
