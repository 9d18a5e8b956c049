//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming. Without an installed
//! recorder every call here is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Folio metrics
pub const METRICS_PREFIX: &str = "folio";

/// Buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,
    0.010,
    0.050,
    0.100,
    0.250,
    0.500,
    1.000,
    2.500,
    5.000,
    10.00,
    20.00,
    30.00,
];

/// Buckets for a single provider call (generation is slow)
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.250,
    0.500,
    1.000,
    2.000,
    4.000,
    8.000,
    15.00,
    30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_chat_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Chat requests by outcome"
    );

    describe_histogram!(
        format!("{}_chat_attempts", METRICS_PREFIX),
        Unit::Count,
        "Provider calls needed per answered chat request"
    );

    describe_counter!(
        format!("{}_provider_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Language-model calls by outcome"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language-model call latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Milliseconds since `start`
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record the outcome of one chat request
pub fn record_chat(outcome: &str, attempts: Option<u32>) {
    counter!(
        format!("{}_chat_answers_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if let Some(attempts) = attempts {
        histogram!(format!("{}_chat_attempts", METRICS_PREFIX)).record(attempts as f64);
    }
}

/// Helper to record a single language-model call
pub fn record_provider_attempt(model: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_provider_attempts_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}
