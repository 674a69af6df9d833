//! HTTP failure classification and retry log formatting.
//!
//! Every failed request is reduced to an [`ErrorClass`], which carries the
//! operator-facing description and suggestion and decides which
//! [`ApiError`] variant the failure becomes.

use super::ApiError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Classification of request failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Request or connect timeout, or HTTP 408
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 malformed request
    InvalidRequest,
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 408 and 429)
    ClientError(u16),
    /// 2xx response whose body could not be decoded
    MalformedResponse,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl ErrorClass {
    /// Short description used inside log messages
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "access denied (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
            Self::MalformedResponse => "malformed response body",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Remediation hint shown with fatal failures
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection or raise --api-timeout",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Consider lowering --rate-limit",
            Self::ServerError(_) => "The API may be experiencing issues, try again later",
            Self::InvalidRequest => "Check the date range and filter arguments",
            Self::AuthFailed(_) => {
                "Verify GONG_ACCESS_KEY, GONG_ACCESS_KEY_SECRET and GONG_SUBDOMAIN"
            }
            Self::ClientError(_) => "Review request parameters against the API documentation",
            Self::MalformedResponse => "The API returned an unexpected payload, try again later",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Whether retrying can help
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidRequest | Self::AuthFailed(_) | Self::ClientError(_)
        )
    }

    /// Convert into the error the retry driver acts on
    pub fn into_api_error(self, detail: impl AsRef<str>, retry_after: Option<Duration>) -> ApiError {
        let message = if detail.as_ref().is_empty() {
            self.description().to_string()
        } else {
            format!("{}: {}", self.description(), detail.as_ref())
        };
        match self {
            Self::RateLimit => ApiError::RateLimited { retry_after },
            class if class.is_retryable() => ApiError::Transient(message),
            class => ApiError::Fatal(format!("{message} ({})", class.suggestion())),
        }
    }
}

/// Classify an HTTP status and/or transport error.
///
/// Any 4xx without a documented retry rule is fatal.
pub fn classify(status: Option<StatusCode>, err: Option<&ReqwestError>) -> ErrorClass {
    if let Some(status) = status {
        match status.as_u16() {
            400 => return ErrorClass::InvalidRequest,
            401 | 403 => return ErrorClass::AuthFailed(status.as_u16()),
            408 => return ErrorClass::NetworkTimeout,
            429 => return ErrorClass::RateLimit,
            _ => {}
        }

        if status.is_server_error() {
            return ErrorClass::ServerError(status.as_u16());
        }

        if status.is_client_error() {
            return ErrorClass::ClientError(status.as_u16());
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return ErrorClass::NetworkTimeout;
        }

        if err.is_connect() {
            return ErrorClass::NetworkOffline;
        }

        if err.is_decode() {
            return ErrorClass::MalformedResponse;
        }
    }

    ErrorClass::NetworkGeneric
}

/// Read `Retry-After` as delta-seconds or an HTTP-date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let delta = at.signed_duration_since(Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Context for formatting retry messages
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Operation being retried ("list page", "transcript 123", ...)
    pub operation: &'a str,
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Attempt ceiling for transient errors
    pub max_attempts: u32,
    /// Delay before the next attempt
    pub backoff: Duration,
}

impl RetryContext<'_> {
    /// Standardized retry message with attempt counters
    pub fn format_retry(&self, error: &ApiError) -> String {
        match error {
            ApiError::RateLimited { .. } => format!(
                "Rate limited on {} - waiting {:.1} seconds (does not count toward {} attempts)",
                self.operation,
                self.backoff.as_secs_f64(),
                self.max_attempts
            ),
            other => format!(
                "Retrying {} (attempt {}/{}) after {} - waiting {:.1} seconds...",
                self.operation,
                self.attempt + 1,
                self.max_attempts,
                other,
                self.backoff.as_secs_f64()
            ),
        }
    }

    /// Final failure line once the ceiling is reached
    pub fn format_failure(&self, error: &ApiError) -> String {
        format!(
            "[FAILED] {} failed after {} attempts; last error: {}",
            self.operation, self.attempt, error
        )
    }
}
