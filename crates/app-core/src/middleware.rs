//! Defines application-specific Axum middleware.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request, available as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Logs every request and its outcome, tagging both lines with a
/// correlation id taken from `x-request-id` or freshly generated. The id is
/// echoed back on the response.
pub async fn request_response_logger(mut req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let c_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(c_id.clone()));

    tracing::info!(
        _cID = c_id,
        method = %method,
        uri = %uri.path(),
        version = ?version,
        "Incoming request"
    );

    let mut response = next.run(req).await;

    let duration_ms = start_time.elapsed().as_millis();
    let status = response.status();

    response.headers_mut().insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&c_id).unwrap_or_else(|_| HeaderValue::from_static("invalid-correlation-id")),
    );

    // Only the path is logged: callback query strings carry authorization codes.
    if status.is_server_error() {
        tracing::error!(_cID = c_id, method = %method, uri = %uri.path(), status = %status, duration_ms, "Request completed with server error");
    } else if status.is_client_error() {
        tracing::warn!(_cID = c_id, method = %method, uri = %uri.path(), status = %status, duration_ms, "Request completed with client error");
    } else {
        tracing::info!(_cID = c_id, method = %method, uri = %uri.path(), status = %status, duration_ms, "Request completed successfully");
    }

    response
}
