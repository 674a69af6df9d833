//! Prometheus metrics for the fetch engine
//!
//! Covers HTTP traffic (including 429s), retry behavior, limiter queueing,
//! per-call outcomes, checkpoint writes and job completion.
//!
//! ## Architecture
//!
//! - Uses the `metrics` facade; recording is a no-op until a recorder is installed
//! - [`init_metrics`] installs the Prometheus exporter with a scrape listener
//! - Nothing here blocks the request path

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: Lazy<Arc<RwLock<u64>>> = Lazy::new(|| Arc::new(RwLock::new(0)));

/// Initialize metrics with a Prometheus scrape endpoint on `addr`.
///
/// Idempotent: later calls are ignored.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the Gong API"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total number of 429 rate limit errors received"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limiter admission"
    );
    describe_counter!(
        "calls_processed_total",
        Unit::Count,
        "Calls processed, labelled by outcome"
    );
    describe_counter!(
        "checkpoint_writes_total",
        Unit::Count,
        "Durable checkpoint mutations"
    );
    describe_counter!(
        "jobs_completed_total",
        Unit::Count,
        "Fetch jobs that reached Done"
    );
    describe_counter!(
        "jobs_failed_total",
        Unit::Count,
        "Fetch jobs that failed or were cancelled"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub async fn generate_correlation_id() -> String {
    let mut counter = CORRELATION_COUNTER.write().await;
    *counter += 1;
    format!("req-{:08x}", *counter)
}

/// Timing and outcome of one HTTP request
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub async fn start(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id().await;

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record completion with an HTTP status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "http_429_errors_total",
                "endpoint" => self.endpoint.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record how long a caller queued for limiter admission
pub fn record_queue_wait(wait: Duration) {
    histogram!("rate_limit_queue_wait_seconds").record(wait.as_secs_f64());
    if wait.as_millis() > 1000 {
        debug!(wait_ms = wait.as_millis(), "Rate limiter admission after wait");
    }
}

/// Record a processed call
///
/// `outcome` is one of `transcribed`, `unavailable`, `failed`.
pub fn record_call_processed(outcome: &'static str) {
    counter!("calls_processed_total", "outcome" => outcome).increment(1);
}

/// Record a durable checkpoint mutation
pub fn record_checkpoint_write(kind: &'static str) {
    counter!("checkpoint_writes_total", "kind" => kind).increment(1);
}

/// Fetch job metrics
pub struct JobMetrics {
    range: String,
    start_time: Instant,
}

impl JobMetrics {
    /// Start tracking a fetch job
    pub fn start(range: impl Into<String>) -> Self {
        let range = range.into();
        info!(range = %range, "Fetch job started");
        Self {
            range,
            start_time: Instant::now(),
        }
    }

    /// Record job completion
    pub fn record_success(&self, transcribed: u64, failed: u64) {
        let duration = self.start_time.elapsed();

        counter!("jobs_completed_total").increment(1);

        info!(
            range = %self.range,
            transcribed = transcribed,
            failed = failed,
            duration_secs = duration.as_secs(),
            "Fetch job completed"
        );
    }

    /// Record job failure
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        counter!("jobs_failed_total").increment(1);

        error!(
            range = %self.range,
            error = %error,
            duration_secs = duration.as_secs(),
            "Fetch job failed"
        );
    }
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
