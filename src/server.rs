//! Axum router construction.
//!
//! The [`app`] function wires the upload endpoint and the operational
//! routes (health, metrics, OpenAPI) and returns a ready-to-serve
//! [`axum::Router`].

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::generate_request_id;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the FileProvider API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FileProvider API",
        version = "0.1.0",
        description = "Image upload service"
    ),
    paths(health_check, crate::handlers::upload::upload),
    components(schemas(crate::metadata::store::UploadedFileRecord)),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Upload", description = "File upload"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_request_size;
    let observability = state.config.observability.clone();

    let mut router = Router::new()
        .route("/api/upload", post(crate::handlers::upload::upload))
        .route("/openapi.json", get(openapi_json));

    if observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let router = router
        // Application state shared across all handlers.
        .with_state(state)
        // common_headers_middleware is innermost (adds standard headers).
        .layer(middleware::from_fn(common_headers_middleware))
        // Request/response tracing spans.
        .layer(TraceLayer::new_for_http())
        // Room for the largest accepted file plus multipart framing.
        .layer(DefaultBodyLimit::max(body_limit));

    if observability.metrics {
        // Outermost so it captures the full request lifecycle.
        router.layer(middleware::from_fn(metrics_middleware))
    } else {
        router
    }
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `FileProvider`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("FileProvider"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- The OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
