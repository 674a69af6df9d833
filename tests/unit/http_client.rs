//! GongHttpClient against a local mock server

use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;
use transcript_downloader::credentials::Credentials;
use transcript_downloader::fetcher::{ApiError, CallsApi, GongHttpClient};
use transcript_downloader::{Cursor, DateRange, ParticipantContext, TranscriptOutcome};

const AUTH: &str = "Basic a2V5OnNlY3JldA==";

fn range() -> DateRange {
    DateRange::parse("2023-01-01", "2023-01-02").unwrap()
}

fn client(server: &Server) -> GongHttpClient {
    let creds = Credentials::new("key", "secret", "acme").unwrap();
    GongHttpClient::new(creds, Duration::from_secs(5))
        .unwrap()
        .with_base_url(server.url())
}

fn list_body() -> serde_json::Value {
    json!({
        "records": { "totalRecords": 3, "cursor": "next-page" },
        "calls": [
            {
                "metaData": {
                    "id": "7001",
                    "started": "2023-01-01T15:30:00-05:00",
                    "duration": 1805.4,
                    "title": "Acme discovery",
                    "direction": "Conference",
                    "meetingUrl": "https://meet.example.com/abc"
                },
                "parties": [
                    {
                        "name": "Ada Lovelace",
                        "emailAddress": "ada@acme.io",
                        "affiliation": "Internal",
                        "speakerId": "s1",
                        "isHost": true
                    },
                    { "emailAddress": "bob@customer.com", "affiliation": "External" }
                ]
            }
        ]
    })
}

#[tokio::test]
async fn test_list_page_sends_filter_and_parses_calls() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/calls/extensive")
        .match_header("authorization", AUTH)
        .match_body(Matcher::PartialJson(json!({
            "filter": {
                "fromDateTime": "2023-01-01T00:00:00Z",
                "toDateTime": "2023-01-03T00:00:00Z"
            },
            "contentSelector": { "exposedFields": { "parties": true } }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(list_body().to_string())
        .create_async()
        .await;

    let page = client(&server).list_page(&range(), None).await.unwrap();
    mock.assert_async().await;

    assert_eq!(page.next_cursor, Some(Cursor::new("next-page")));
    assert_eq!(page.total_records, Some(3));
    assert_eq!(page.calls.len(), 1);
    let call = &page.calls[0];
    assert_eq!(call.id, "7001");
    assert_eq!(call.started.to_rfc3339(), "2023-01-01T20:30:00+00:00");
    assert_eq!(call.duration_secs, 1805);
    assert_eq!(call.participants.len(), 2);
    assert_eq!(call.participants[0].context, ParticipantContext::Internal);
    assert!(call.participants[0].is_host);
    assert_eq!(call.participants[1].display_name(), "bob@customer.com");
}

#[tokio::test]
async fn test_list_page_forwards_cursor() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/calls/extensive")
        .match_body(Matcher::PartialJson(json!({ "cursor": "abc" })))
        .with_status(200)
        .with_body(json!({ "records": {}, "calls": [] }).to_string())
        .create_async()
        .await;

    let page = client(&server)
        .list_page(&range(), Some(&Cursor::new("abc")))
        .await
        .unwrap();
    mock.assert_async().await;
    assert!(page.calls.is_empty());
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_transcript_is_flattened_in_order() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/transcript")
        .match_header("authorization", AUTH)
        .match_body(Matcher::PartialJson(json!({
            "filter": { "callIds": ["7001"] }
        })))
        .with_status(200)
        .with_body(
            json!({
                "callTranscripts": [{
                    "callId": "7001",
                    "transcript": [
                        {
                            "speakerId": "s1",
                            "topic": "Intro",
                            "sentences": [
                                { "start": 0, "end": 1200, "text": "Hi there." },
                                { "start": 1200, "end": 2500, "text": "Thanks for joining." }
                            ]
                        },
                        {
                            "speakerId": "s2",
                            "sentences": [{ "start": 2600, "end": 4000, "text": "Happy to be here." }]
                        }
                    ]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let outcome = client(&server)
        .fetch_transcript(&range(), "7001")
        .await
        .unwrap();
    let transcript = outcome.transcript().expect("transcript expected");
    assert_eq!(transcript.call_id, "7001");
    let texts: Vec<_> = transcript.utterances.iter().map(|u| u.text.as_str()).collect();
    assert_eq!(texts, vec!["Hi there.", "Thanks for joining.", "Happy to be here."]);
    assert_eq!(transcript.utterances[1].topic.as_deref(), Some("Intro"));
    assert_eq!(transcript.utterances[2].speaker_id.as_deref(), Some("s2"));
}

#[tokio::test]
async fn test_empty_transcript_is_not_available() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/transcript")
        .with_status(200)
        .with_body(json!({ "callTranscripts": [] }).to_string())
        .create_async()
        .await;

    let outcome = client(&server)
        .fetch_transcript(&range(), "7001")
        .await
        .unwrap();
    assert_eq!(outcome, TranscriptOutcome::NotAvailable);
}

#[tokio::test]
async fn test_429_carries_retry_after() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/transcript")
        .with_status(429)
        .with_header("retry-after", "7")
        .create_async()
        .await;

    let err = client(&server)
        .fetch_transcript(&range(), "7001")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
}

#[tokio::test]
async fn test_429_without_header() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/extensive")
        .with_status(429)
        .create_async()
        .await;

    let err = client(&server).list_page(&range(), None).await.unwrap_err();
    assert_eq!(err, ApiError::RateLimited { retry_after: None });
}

#[tokio::test]
async fn test_status_classification() {
    let cases = [
        (503, false),
        (500, false),
        (408, false),
        (400, true),
        (401, true),
        (403, true),
        (404, true),
    ];
    for (status, fatal) in cases {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v2/calls/extensive")
            .with_status(status)
            .with_body("nope")
            .create_async()
            .await;

        let err = client(&server).list_page(&range(), None).await.unwrap_err();
        assert_eq!(err.is_fatal(), fatal, "status {status} gave {err:?}");
        if !fatal {
            assert!(matches!(err, ApiError::Transient(_)), "status {status}");
        }
    }
}

#[tokio::test]
async fn test_auth_failure_message_names_credentials() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/extensive")
        .with_status(401)
        .with_body(r#"{"errors":["Invalid credentials"]}"#)
        .create_async()
        .await;

    let err = client(&server).list_page(&range(), None).await.unwrap_err();
    let ApiError::Fatal(message) = err else {
        panic!("expected fatal error, got {err:?}");
    };
    assert!(message.contains("401"));
    assert!(message.contains("Invalid credentials"));
    assert!(message.contains("GONG_ACCESS_KEY"));
}

#[tokio::test]
async fn test_malformed_success_body_is_transient() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/extensive")
        .with_status(200)
        .with_body("{\"calls\": [")
        .create_async()
        .await;

    let err = client(&server).list_page(&range(), None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transient(_)));
}

#[tokio::test]
async fn test_call_without_start_time_is_transient() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v2/calls/extensive")
        .with_status(200)
        .with_body(json!({ "calls": [{ "metaData": { "id": "1" } }] }).to_string())
        .create_async()
        .await;

    let err = client(&server).list_page(&range(), None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transient(ref m) if m.contains("start time")));
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let creds = Credentials::new("key", "secret", "acme").unwrap();
    let client = GongHttpClient::new(creds, Duration::from_secs(2))
        .unwrap()
        .with_base_url("http://127.0.0.1:1");

    let err = client.list_page(&range(), None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transient(_)));
}

#[tokio::test]
async fn test_connection_check() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("GET", "/v2/calls")
        .match_header("authorization", AUTH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("fromDateTime".into(), "2023-01-01T00:00:00Z".into()),
            Matcher::UrlEncoded("toDateTime".into(), "2023-01-03T00:00:00Z".into()),
        ]))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    client(&server).test_connection(&range()).await.unwrap();
    ok.assert_async().await;

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v2/calls")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let err = client(&server).test_connection(&range()).await.unwrap_err();
    assert!(err.is_fatal());
}
