//! Per-request Prometheus metrics

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use rag_common::metrics::RequestMetrics;

/// Record count and latency labelled by route template, not raw path
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let tracker = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());
    response
}
