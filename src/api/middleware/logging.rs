//! Request logging middleware using tracing.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Logs each request with its status and latency.
///
/// Health probes log at debug; server errors log at warn.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let start = Instant::now();

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        warn!(%method, path, ?query, status, duration_ms, "Request failed");
    } else if path.ends_with("/health") {
        debug!(%method, path, status, duration_ms, "Health probe");
    } else {
        info!(%method, path, ?query, status, duration_ms, "Request completed");
    }

    response
}
