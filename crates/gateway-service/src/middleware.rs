//! Middleware chain (spec.md §4.6): panic-recovery -> rate-limit -> logging
//! -> security/CORS -> handler, outer to inner. Panic recovery and logging
//! are layered in `main.rs` via `tower_http`; this module carries the two
//! gateway-specific layers: rate limiting and security headers, plus
//! request-ID propagation.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Token-bucket admission check, keyed by the spec's loopback-aware client
/// IP resolution. Denied requests get `429` with `Retry-After: 1`
/// (spec.md §4.5 error mapping).
pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let forwarded_for = header_str(&request, "x-forwarded-for");
    let real_ip = header_str(&request, "x-real-ip");
    let ip = gateway_core::ratelimit::client_ip(peer.ip(), forwarded_for.as_deref(), real_ip.as_deref());

    if !state.rate_limiter.allow(ip).await {
        let mut response = Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .body(axum::body::Body::from("rate limit exceeded"))
            .expect("static rate-limit response is well-formed");
        response
            .headers_mut()
            .insert("retry-after", HeaderValue::from_static("1"));
        return response;
    }

    next.run(request).await
}

fn header_str(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Generates an `X-Request-ID` if the client didn't send one, stashes it as
/// a request extension for the handler, and echoes it on the response
/// (spec.md §6).
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Clone)]
pub struct RequestId(pub String);

/// Always-on security headers (spec.md §4.6), applied regardless of route.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}
