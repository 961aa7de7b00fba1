//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the research loop with
//! standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all agentic RAG metrics
pub const METRICS_PREFIX: &str = "agentic_rag";

/// Buckets for provider latency (external APIs are slow)
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Session metrics
    describe_counter!(
        format!("{}_sessions_total", METRICS_PREFIX),
        Unit::Count,
        "Research sessions by outcome"
    );

    describe_histogram!(
        format!("{}_session_hops", METRICS_PREFIX),
        Unit::Count,
        "Hops executed per research session"
    );

    describe_histogram!(
        format!("{}_session_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end research session latency in seconds"
    );

    // Provider metrics
    describe_counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Provider calls by provider and status"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider call latency in seconds"
    );

    // Search metrics
    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Aggregated search latency per hop in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from the last aggregated search"
    );

    // Rerank metrics
    describe_counter!(
        format!("{}_rerank_total", METRICS_PREFIX),
        Unit::Count,
        "Rerank passes by mode (scored, passthrough, fallback)"
    );

    // Stream metrics
    describe_counter!(
        format!("{}_stream_events_total", METRICS_PREFIX),
        Unit::Count,
        "Progress events emitted by type"
    );

    describe_gauge!(
        format!("{}_active_streams", METRICS_PREFIX),
        Unit::Count,
        "Streams currently connected"
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

/// Record a single provider call
pub fn record_provider_call(provider: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// Record one aggregated search hop
pub fn record_search(duration_secs: f64, sources: usize, result_count: usize) {
    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "sources" => sources.to_string()
    )
    .record(duration_secs);

    gauge!(format!("{}_search_results_count", METRICS_PREFIX)).set(result_count as f64);
}

/// Record a rerank pass
pub fn record_rerank(mode: &str) {
    counter!(
        format!("{}_rerank_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Record a finished research session
pub fn record_session(outcome: &str, hops: usize, duration_secs: f64) {
    counter!(
        format!("{}_sessions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_session_hops", METRICS_PREFIX)).record(hops as f64);
    histogram!(format!("{}_session_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record an emitted progress event
pub fn record_stream_event(event_type: &'static str) {
    counter!(
        format!("{}_stream_events_total", METRICS_PREFIX),
        "type" => event_type
    )
    .increment(1);
}

/// Publish the number of connected streams
pub fn set_active_streams(count: usize) {
    gauge!(format!("{}_active_streams", METRICS_PREFIX)).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in PROVIDER_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/api/rag/search/sync");
        metrics.finish(200);
        record_provider_call("tavily", 0.2, true);
        record_session("completed", 2, 1.5);
        record_stream_event("done");
        // No recorder installed; just verify nothing panics
    }
}
