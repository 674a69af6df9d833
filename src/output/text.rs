//! Human-readable transcript and participant summaries

use super::participants::ParticipantRecord;
use crate::{CallRecord, CallSummary};
use std::collections::HashMap;

const WIDE_RULE: usize = 80;
const NARROW_RULE: usize = 40;

/// `[MM:SS]` for a millisecond offset; minutes keep counting past 59
pub fn format_offset(ms: u64) -> String {
    format!("[{:02}:{:02}]", ms / 60_000, (ms % 60_000) / 1000)
}

fn speaker_names(call: &CallSummary) -> HashMap<&str, &str> {
    call.participants
        .iter()
        .filter_map(|p| Some((p.speaker_id.as_deref()?, p.display_name())))
        .collect()
}

/// Render one call as text
pub fn format_transcript_text(record: &CallRecord) -> String {
    let call = &record.summary;
    let mut lines = Vec::new();
    let or_na = |v: &str| if v.is_empty() { "N/A".to_string() } else { v.to_string() };

    lines.push("=".repeat(WIDE_RULE));
    lines.push("CALL TRANSCRIPT".to_string());
    lines.push("=".repeat(WIDE_RULE));
    lines.push(format!("Call ID: {}", call.id));
    lines.push(format!("Date: {}", call.date()));
    lines.push(format!("Time: {}", call.time_of_day()));
    lines.push(format!("Duration: {} minutes", call.duration_minutes()));
    lines.push(format!("Title: {}", or_na(&call.title)));
    lines.push(format!(
        "Direction: {}",
        or_na(call.direction.as_deref().unwrap_or_default())
    ));
    if !call.participants.is_empty() {
        let names: Vec<&str> = call.participants.iter().map(|p| p.display_name()).collect();
        lines.push(format!("Participants: {}", names.join(", ")));
    }
    lines.push("-".repeat(WIDE_RULE));
    lines.push(String::new());

    match record.transcript.transcript() {
        Some(transcript) => {
            let names = speaker_names(call);
            for utterance in &transcript.utterances {
                let speaker = utterance
                    .speaker_id
                    .as_deref()
                    .map(|id| names.get(id).copied().unwrap_or(id))
                    .unwrap_or("Unknown Speaker");
                let stamp = format_offset(utterance.start_ms);
                match &utterance.topic {
                    Some(topic) => {
                        lines.push(format!("{stamp} {speaker} ({topic}): {}", utterance.text))
                    }
                    None => lines.push(format!("{stamp} {speaker}: {}", utterance.text)),
                }
            }
        }
        None => lines.push("No transcript available for this call.".to_string()),
    }

    lines.push(String::new());
    lines.push("=".repeat(WIDE_RULE));
    lines.join("\n")
}

/// Render a participant's call history
pub fn format_participant_summary(record: &ParticipantRecord) -> String {
    let mut lines = vec![
        "=".repeat(WIDE_RULE),
        "PARTICIPANT SUMMARY".to_string(),
        "=".repeat(WIDE_RULE),
        format!("Name: {}", record.display_name()),
        format!("Email: {}", record.email),
        format!("Context: {}", record.context.as_str()),
    ];
    if !record.company.is_empty() {
        lines.push(format!("Company: {}", record.company));
    }
    lines.push(format!("Total Calls: {}", record.total_calls));
    lines.push(format!(
        "Total Duration: {} minutes",
        record.total_duration_minutes
    ));
    lines.push(format!("First Seen: {}", record.first_seen));
    lines.push(format!("Last Seen: {}", record.last_seen));
    lines.push(String::new());
    lines.push("Call History:".to_string());
    lines.push("-".repeat(NARROW_RULE));
    lines.extend(record.call_ids.iter().map(|id| format!("  Call ID: {id}")));
    lines.push(String::new());
    lines.push("=".repeat(WIDE_RULE));
    lines.join("\n")
}
