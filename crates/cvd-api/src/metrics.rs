//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Path label for requests that matched no route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "cvd_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cvd_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "cvd_http_requests_in_flight";

    // Job metrics
    pub const JOBS_COMPLETED_TOTAL: &str = "cvd_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "cvd_jobs_failed_total";
    pub const JOBS_ACTIVE: &str = "cvd_jobs_active";
    pub const FFMPEG_DURATION_SECONDS: &str = "cvd_ffmpeg_duration_seconds";
    pub const UPLOAD_BYTES_TOTAL: &str = "cvd_upload_bytes_total";

    // Scratch cleanup
    pub const CLEANUP_FAILURES_TOTAL: &str = "cvd_cleanup_failures_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "cvd_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a job whose transcode succeeded.
pub fn record_job_completed(filter: &str) {
    let labels = [("filter", filter.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

/// Record a job that ended without a published output.
pub fn record_job_failed(filter: &str, reason: &str) {
    let labels = [("filter", filter.to_string()), ("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Track the number of running FFmpeg processes.
pub fn adjust_active_jobs(delta: f64) {
    gauge!(names::JOBS_ACTIVE).increment(delta);
}

/// Record FFmpeg processing duration.
pub fn record_ffmpeg_duration(filter: &str, duration_secs: f64) {
    let labels = [("filter", filter.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record bytes written to scratch from an upload.
pub fn record_upload_bytes(bytes: u64) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

/// Record a scratch file that could not be removed.
pub fn record_cleanup_failure() {
    counter!(names::CLEANUP_FAILURES_TOTAL).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Route template of a request, so label cardinality is bounded by the router.
fn path_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = path_label(&request);
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
