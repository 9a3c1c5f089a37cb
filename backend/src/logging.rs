use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::routes::CLIENT_HEADER;

/// Middleware that logs each HTTP request with the calling portal client.
///
/// Server errors are logged at WARN, everything else at INFO.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = request
        .headers()
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            client = %client,
            status = %status.as_u16(),
            duration_ms = %duration_ms,
            "HTTP request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            client = %client,
            status = %status.as_u16(),
            duration_ms = %duration_ms,
            "HTTP request"
        );
    }

    response
}
