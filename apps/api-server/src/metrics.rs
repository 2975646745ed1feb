//! Prometheus metrics for the HTTP surface and the user store.
//!
//! The recorder is installed once in `main`; handlers and the middleware only
//! use the `metrics` macros, which are no-ops when no recorder is installed
//! (as in unit tests).

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// HTTP requests counter metric name.
pub const METRIC_HTTP_REQUESTS: &str = "http_requests_total";
/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
/// Users created counter metric name.
pub const METRIC_USERS_CREATED: &str = "users_created_total";
/// Failed user inserts counter metric name.
pub const METRIC_USER_INSERT_FAILURES: &str = "user_insert_failures_total";
/// Failed health-check probes counter metric name.
pub const METRIC_PROBE_FAILURES: &str = "healthcheck_probe_failures_total";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global Prometheus recorder and register metric descriptions.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(METRIC_HTTP_REQUEST_DURATION.to_string()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()?;
    describe();
    Ok(handle)
}

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    describe_counter!(METRIC_HTTP_REQUESTS, "Total number of HTTP requests served");
    describe_histogram!(
        METRIC_HTTP_REQUEST_DURATION,
        "HTTP request latency in seconds"
    );
    describe_counter!(METRIC_USERS_CREATED, "Total number of users created");
    describe_counter!(
        METRIC_USER_INSERT_FAILURES,
        "Total number of user inserts rejected by the store"
    );
    describe_counter!(
        METRIC_PROBE_FAILURES,
        "Total number of failed health-check liveness probes"
    );

    debug!("Metrics initialized");
}

/// Middleware recording request count and latency per matched route.
pub async fn track_http(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    counter!(METRIC_HTTP_REQUESTS, "method" => method.clone(), "path" => path.clone(), "status" => status)
        .increment(1);
    histogram!(METRIC_HTTP_REQUEST_DURATION, "method" => method, "path" => path)
        .record(start.elapsed().as_secs_f64());
    response
}

/// Increment users created counter.
pub fn inc_users_created() {
    counter!(METRIC_USERS_CREATED).increment(1);
}

/// Increment failed user inserts counter.
pub fn inc_user_insert_failures() {
    counter!(METRIC_USER_INSERT_FAILURES).increment(1);
}

/// Increment failed liveness probes counter.
pub fn inc_probe_failures() {
    counter!(METRIC_PROBE_FAILURES).increment(1);
}
