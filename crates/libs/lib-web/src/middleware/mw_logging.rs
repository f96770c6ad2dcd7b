//! # Request/Response Logging Middleware
//!
//! Logs one line per request and one per response, correlated by the
//! request ID from the stamping middleware. Credentials never reach the
//! log: auth endpoints are body-opaque and sensitive headers are elided
//! wholesale (only counts are logged).

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Endpoints whose payloads must never be logged.
const SENSITIVE_ENDPOINTS: &[&str] = &["/api/auth/login", "/api/auth/signup"];

/// Request/response logging middleware.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path().to_string();

    let request_id = req
        .extensions()
        .get::<crate::middleware::mw_req_stamp::RequestStamp>()
        .map(|s| s.id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let sensitive = SENSITIVE_ENDPOINTS.iter().any(|ep| path.starts_with(ep));

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        query = ?uri.query().filter(|_| !sensitive),
        "[REQUEST] {} {}",
        method,
        path
    );

    let res = next.run(req).await;

    let status = res.status();
    let latency_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        warn!(
            request_id = %request_id,
            status = %status,
            latency_ms,
            "[RESPONSE] {} {} -> {} ({}ms)",
            method,
            path,
            status,
            latency_ms
        );
    } else {
        info!(
            request_id = %request_id,
            status = %status,
            latency_ms,
            "[RESPONSE] {} {} -> {} ({}ms)",
            method,
            path,
            status,
            latency_ms
        );
    }

    res
}
