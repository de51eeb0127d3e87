//! Service middleware for request metrics.
//!
//! ## Metrics Exposed
//!
//! - `resolve_engine_requests_total` - Counter of requests by path, method, status
//! - `resolve_engine_request_duration_seconds` - Histogram of request latency
//! - `resolve_engine_resolutions_total` - Counter of resolutions by entry

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing for now - can be upgraded to prometheus metrics later.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "resolve_engine::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces UUIDs embedded in paths with a placeholder.
fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .expect("static pattern");

    uuid_regex.replace_all(path, ":id").to_string()
}

/// Record resolution metrics after resolving an entry.
pub fn record_resolution_metrics(entry: &str, short_circuit: bool, latency_ms: u64) {
    info!(
        target: "resolve_engine::metrics",
        metric_type = "resolution",
        entry = %entry,
        short_circuit = short_circuit,
        latency_ms = latency_ms,
        "resolution_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_uuids() {
        let path = "/api/resolve/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/resolve/:id");
    }

    #[test]
    fn test_normalize_path_leaves_plain_paths() {
        assert_eq!(normalize_path("/api/resolve"), "/api/resolve");
    }
}
