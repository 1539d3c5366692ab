//! Prometheus metrics for FileProvider.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "fileprovider_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "fileprovider_http_request_duration_seconds";

/// Upload attempts by result (counter). Labels: outcome.
pub const UPLOADS_TOTAL: &str = "fileprovider_uploads_total";

/// Bytes of successfully stored files (counter).
pub const UPLOAD_BYTES_TOTAL: &str = "fileprovider_upload_bytes_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
///
/// The recorder needs periodic upkeep; see [`spawn_upkeep`].
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("a global metrics recorder was already installed");
        }
        handle
    })
}

/// Drain histogram buffers every `interval` for the lifetime of the runtime.
pub fn spawn_upkeep(handle: &'static PrometheusHandle, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            handle.run_upkeep();
        }
    });
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPLOADS_TOTAL, "Upload attempts by outcome");
    describe_counter!(UPLOAD_BYTES_TOTAL, "Total bytes of stored uploads");
}

/// Count one upload attempt.  `bytes` is added only for stored files.
pub fn record_upload(outcome: &'static str, bytes: u64) {
    counter!(UPLOADS_TOTAL, "outcome" => outcome).increment(1);
    if bytes > 0 {
        counter!(UPLOAD_BYTES_TOTAL).increment(bytes);
    }
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to a bounded label value.
///
/// Known routes keep their path; everything else collapses to `/{other}`
/// so that arbitrary probes cannot blow up label cardinality.
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/openapi.json" | "/api/upload" => path.to_string(),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_known_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/openapi.json"), "/openapi.json");
        assert_eq!(normalize_path("/api/upload"), "/api/upload");
    }

    #[test]
    fn test_normalize_path_unknown_collapses() {
        assert_eq!(normalize_path("/wp-admin"), "/{other}");
        assert_eq!(normalize_path("/api/upload/extra"), "/{other}");
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        let first = init_metrics() as *const PrometheusHandle;
        let second = init_metrics() as *const PrometheusHandle;
        assert_eq!(first, second);
    }
}
