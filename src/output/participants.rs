//! Participant ledger
//!
//! Folds every persisted call into per-person statistics keyed by lowercased
//! email, else lowercased name, else `"unknown"`.

use crate::{CallSummary, Participant, ParticipantContext};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Identity key of a participant
pub fn participant_key(participant: &Participant) -> String {
    let pick = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    };
    pick(&participant.email)
        .or_else(|| pick(&participant.name))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Cumulative statistics for one person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    /// Identity key
    pub key: String,
    /// Name as first seen
    pub name: String,
    /// Email as first seen
    pub email: String,
    /// Internal / External / Unknown
    pub context: ParticipantContext,
    /// Company, if any call reported one
    pub company: String,
    /// Job title, if any call reported one
    pub title: String,
    /// Speaker id from the first call
    pub speaker_id: String,
    /// Calls attended
    pub total_calls: u64,
    /// Sum of call durations in minutes
    pub total_duration_minutes: u64,
    /// Calls hosted
    pub is_host_count: u64,
    /// Calls organized
    pub is_organizer_count: u64,
    /// Earliest call date (`YYYY-MM-DD`)
    pub first_seen: String,
    /// Latest call date (`YYYY-MM-DD`)
    pub last_seen: String,
    /// Call ids in the order they were folded in
    pub call_ids: Vec<String>,
    /// Distinct call dates
    pub call_dates: BTreeSet<String>,
}

impl ParticipantRecord {
    fn new(key: String, participant: &Participant, date: &str) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            key,
            name: text(&participant.name),
            email: text(&participant.email),
            context: participant.context,
            company: text(&participant.company),
            title: text(&participant.title),
            speaker_id: text(&participant.speaker_id),
            total_calls: 0,
            total_duration_minutes: 0,
            is_host_count: 0,
            is_organizer_count: 0,
            first_seen: date.to_string(),
            last_seen: date.to_string(),
            call_ids: Vec::new(),
            call_dates: BTreeSet::new(),
        }
    }

    /// Mean call length in minutes
    pub fn average_duration_minutes(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_duration_minutes as f64 / self.total_calls as f64
        }
    }

    /// Name for display, falling back to email then key
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.email.is_empty() {
            &self.email
        } else {
            &self.key
        }
    }
}

/// Participant statistics across all persisted calls
#[derive(Debug, Default, Clone)]
pub struct ParticipantLedger {
    records: BTreeMap<String, ParticipantRecord>,
    folded: HashSet<String>,
}

impl ParticipantLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one call in; a call already folded is ignored
    pub fn add_call(&mut self, call: &CallSummary) {
        if !self.folded.insert(call.id.clone()) {
            return;
        }
        let date = call.date();
        let minutes = call.duration_minutes();
        // A person listed twice on one call counts once.
        let mut seen_on_call = HashSet::new();

        for participant in &call.participants {
            let key = participant_key(participant);
            if !seen_on_call.insert(key.clone()) {
                continue;
            }
            let record = self
                .records
                .entry(key.clone())
                .or_insert_with(|| ParticipantRecord::new(key, participant, &date));

            record.total_calls += 1;
            record.total_duration_minutes += minutes;
            record.is_host_count += u64::from(participant.is_host);
            record.is_organizer_count += u64::from(participant.is_organizer);
            if date < record.first_seen {
                record.first_seen = date.clone();
            }
            if date > record.last_seen {
                record.last_seen = date.clone();
            }
            if record.company.is_empty() {
                record.company = participant.company.clone().unwrap_or_default();
            }
            if record.title.is_empty() {
                record.title = participant.title.clone().unwrap_or_default();
            }
            if record.context == ParticipantContext::Unknown {
                record.context = participant.context;
            }
            record.call_ids.push(call.id.clone());
            record.call_dates.insert(date.clone());
        }
    }

    /// Records ordered by key
    pub fn records(&self) -> impl Iterator<Item = &ParticipantRecord> {
        self.records.values()
    }

    /// Record for `key`
    pub fn get(&self, key: &str) -> Option<&ParticipantRecord> {
        self.records.get(key)
    }

    /// Number of distinct participants
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no participant has been seen
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
