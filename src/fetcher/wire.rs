//! Gong `v2` request and response payloads
//!
//! Stateless conversion between the JSON the API speaks and the crate's
//! domain types. Decoding problems in a successful response are reported
//! as [`ApiError::Transient`]: a truncated body is worth another attempt.

use super::{ApiError, ApiResult, CallPage};
use crate::{
    CallSummary, Cursor, DateRange, Participant, ParticipantContext, Transcript,
    TranscriptOutcome, Utterance,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// List endpoint path
pub const EXTENSIVE_CALLS_ENDPOINT: &str = "/v2/calls/extensive";
/// Transcript endpoint path
pub const TRANSCRIPT_ENDPOINT: &str = "/v2/calls/transcript";
/// Plain call listing, used as a connectivity check
pub const CALLS_ENDPOINT: &str = "/v2/calls";

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct DateFilter {
    from_date_time: String,
    to_date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ExposedFields {
    parties: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ContentSelector {
    exposed_fields: ExposedFields,
}

/// Body of `POST /v2/calls/extensive`
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtensiveCallsRequest {
    filter: DateFilter,
    content_selector: ContentSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
}

impl ExtensiveCallsRequest {
    /// Request for one page of `range`
    pub fn new(range: &DateRange, cursor: Option<&Cursor>) -> Self {
        Self {
            filter: DateFilter {
                from_date_time: range.from_datetime(),
                to_date_time: range.to_datetime(),
                call_ids: None,
            },
            content_selector: ContentSelector {
                exposed_fields: ExposedFields { parties: true },
            },
            cursor: cursor.map(|c| c.as_str().to_string()),
        }
    }
}

/// Body of `POST /v2/calls/transcript`
#[derive(Debug, Serialize, PartialEq)]
pub struct TranscriptRequest {
    filter: DateFilter,
}

impl TranscriptRequest {
    /// Request for a single call
    pub fn new(range: &DateRange, call_id: &str) -> Self {
        Self {
            filter: DateFilter {
                from_date_time: range.from_datetime(),
                to_date_time: range.to_datetime(),
                call_ids: Some(vec![call_id.to_string()]),
            },
        }
    }
}

/// Paging block of a list response
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Records {
    /// Calls matching the filter across all pages
    #[serde(default)]
    pub total_records: Option<u64>,
    /// Present when more pages follow
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Call metadata block
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetaData {
    /// Call id
    pub id: Option<String>,
    /// ISO-8601 start time with offset
    pub started: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Title
    #[serde(default)]
    pub title: Option<String>,
    /// Direction
    #[serde(default)]
    pub direction: Option<String>,
    /// Meeting link
    #[serde(default)]
    pub meeting_url: Option<String>,
}

/// A party on a call
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireParty {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Email
    #[serde(default)]
    pub email_address: Option<String>,
    /// "Internal" / "External"
    #[serde(default, alias = "context")]
    pub affiliation: Option<String>,
    /// Speaker reference
    #[serde(default)]
    pub speaker_id: Option<String>,
    /// Job title
    #[serde(default)]
    pub title: Option<String>,
    /// Company
    #[serde(default)]
    pub company: Option<String>,
    /// Host flag
    #[serde(default)]
    pub is_host: Option<bool>,
    /// Organizer flag
    #[serde(default)]
    pub is_organizer: Option<bool>,
}

/// One call in a list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCall {
    /// Metadata block
    pub meta_data: WireMetaData,
    /// Parties, when requested through the content selector
    #[serde(default)]
    pub parties: Vec<WireParty>,
}

/// Response of `POST /v2/calls/extensive`
#[derive(Debug, Deserialize)]
pub struct ExtensiveCallsResponse {
    /// Paging information
    #[serde(default)]
    pub records: Records,
    /// Calls on this page
    #[serde(default)]
    pub calls: Vec<WireCall>,
}

/// A sentence inside a monologue
#[derive(Debug, Deserialize)]
pub struct WireSentence {
    /// Start offset in milliseconds
    #[serde(default)]
    pub start: u64,
    /// End offset in milliseconds
    #[serde(default)]
    pub end: u64,
    /// Text
    #[serde(default)]
    pub text: String,
}

/// A run of sentences by one speaker
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMonologue {
    /// Speaker reference
    #[serde(default)]
    pub speaker_id: Option<String>,
    /// Topic label
    #[serde(default)]
    pub topic: Option<String>,
    /// Sentences in order
    #[serde(default)]
    pub sentences: Vec<WireSentence>,
}

/// Transcript of one call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCallTranscript {
    /// Call id
    pub call_id: String,
    /// Monologues in order
    #[serde(default)]
    pub transcript: Vec<WireMonologue>,
}

/// Response of `POST /v2/calls/transcript`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResponse {
    /// Transcripts for the requested calls that have one
    #[serde(default)]
    pub call_transcripts: Vec<WireCallTranscript>,
}

impl From<WireParty> for Participant {
    fn from(party: WireParty) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Participant {
            context: ParticipantContext::from_api(party.affiliation.as_deref()),
            name: non_empty(party.name),
            email: non_empty(party.email_address),
            speaker_id: non_empty(party.speaker_id),
            title: non_empty(party.title),
            company: non_empty(party.company),
            is_host: party.is_host.unwrap_or(false),
            is_organizer: party.is_organizer.unwrap_or(false),
        }
    }
}

impl TryFrom<WireCall> for CallSummary {
    type Error = ApiError;

    fn try_from(call: WireCall) -> ApiResult<Self> {
        let meta = call.meta_data;
        let id = meta
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Transient("call without id in list response".to_string()))?;
        let started = meta
            .started
            .as_deref()
            .ok_or_else(|| ApiError::Transient(format!("call {id} has no start time")))
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| ApiError::Transient(format!("call {id} start time '{raw}': {e}")))
            })?;

        Ok(CallSummary {
            id,
            started,
            duration_secs: meta.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            title: meta.title.unwrap_or_default(),
            direction: meta.direction,
            meeting_url: meta.meeting_url,
            participants: call.parties.into_iter().map(Participant::from).collect(),
            transcript_available: true,
        })
    }
}

/// Convert a list response into a page
pub fn parse_call_page(response: ExtensiveCallsResponse) -> ApiResult<CallPage> {
    let calls = response
        .calls
        .into_iter()
        .map(CallSummary::try_from)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(CallPage {
        calls,
        next_cursor: response
            .records
            .cursor
            .filter(|c| !c.is_empty())
            .map(Cursor::new),
        total_records: response.records.total_records,
    })
}

/// Pick `call_id` out of a transcript response.
///
/// Missing entries and empty monologue lists both mean the call was never
/// transcribed.
pub fn parse_transcript(call_id: &str, response: TranscriptResponse) -> TranscriptOutcome {
    let Some(entry) = response
        .call_transcripts
        .into_iter()
        .find(|t| t.call_id == call_id)
    else {
        return TranscriptOutcome::NotAvailable;
    };

    let utterances: Vec<Utterance> = entry
        .transcript
        .into_iter()
        .flat_map(|monologue| {
            let speaker_id = monologue.speaker_id;
            let topic = monologue.topic.filter(|t| !t.is_empty());
            monologue.sentences.into_iter().map(move |s| Utterance {
                speaker_id: speaker_id.clone(),
                topic: topic.clone(),
                start_ms: s.start,
                end_ms: s.end,
                text: s.text,
            })
        })
        .collect();

    if utterances.is_empty() {
        TranscriptOutcome::NotAvailable
    } else {
        TranscriptOutcome::Available(Transcript {
            call_id: call_id.to_string(),
            utterances,
        })
    }
}
