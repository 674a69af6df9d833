//! Gong HTTP client
//!
//! Each call is a single attempt: failures are classified into an
//! [`ApiError`] and the caller's retry driver decides what happens next.

use super::classify::{classify, parse_retry_after, ErrorClass};
use super::wire::{
    self, ExtensiveCallsRequest, ExtensiveCallsResponse, TranscriptRequest, TranscriptResponse,
    CALLS_ENDPOINT, EXTENSIVE_CALLS_ENDPOINT, TRANSCRIPT_ENDPOINT,
};
use super::{ApiError, ApiResult, CallPage, CallsApi};
use crate::credentials::Credentials;
use crate::metrics::HttpRequestMetrics;
use crate::{Cursor, DateRange, TranscriptOutcome};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// Gong `v2` API client
#[derive(Clone)]
pub struct GongHttpClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl GongHttpClient {
    /// Client for the account in `credentials`
    pub fn new(credentials: Credentials, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("transcript-downloader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: credentials.base_url(),
            credentials,
        })
    }

    /// Point the client at another host (test servers, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check credentials and reachability with a lightweight listing call
    pub async fn test_connection(&self, range: &DateRange) -> ApiResult<()> {
        let request = self
            .client
            .get(format!("{}{}", self.base_url, CALLS_ENDPOINT))
            .query(&[
                ("fromDateTime", range.from_datetime()),
                ("toDateTime", range.to_datetime()),
            ]);
        self.send(CALLS_ENDPOINT, request).await?;
        Ok(())
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .json(body);
        let response = self.send(endpoint, request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| classify(None, Some(&e)).into_api_error(e.to_string(), None))?;
        serde_json::from_str(&text)
            .map_err(|e| ErrorClass::MalformedResponse.into_api_error(e.to_string(), None))
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> ApiResult<Response> {
        let metrics = HttpRequestMetrics::start(endpoint).await;
        let response = request
            .basic_auth(
                self.credentials.access_key(),
                Some(self.credentials.access_key_secret()),
            )
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics.record_network_error();
                return Err(classify(None, Some(&e)).into_api_error(e.to_string(), None));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());
        if status.is_success() {
            debug!(
                correlation_id = metrics.correlation_id(),
                endpoint = endpoint,
                status = status.as_u16(),
                "Request succeeded"
            );
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        let detail = format!("{endpoint} returned {status}: {}", body.trim());
        Err(classify(Some(status), None).into_api_error(detail, retry_after))
    }
}

#[async_trait]
impl CallsApi for GongHttpClient {
    async fn list_page(&self, range: &DateRange, cursor: Option<&Cursor>) -> ApiResult<CallPage> {
        let body = ExtensiveCallsRequest::new(range, cursor);
        let response: ExtensiveCallsResponse =
            self.post_json(EXTENSIVE_CALLS_ENDPOINT, &body).await?;
        wire::parse_call_page(response)
    }

    async fn fetch_transcript(
        &self,
        range: &DateRange,
        call_id: &str,
    ) -> ApiResult<TranscriptOutcome> {
        let body = TranscriptRequest::new(range, call_id);
        let response: TranscriptResponse = self.post_json(TRANSCRIPT_ENDPOINT, &body).await?;
        Ok(wire::parse_transcript(call_id, response))
    }
}
