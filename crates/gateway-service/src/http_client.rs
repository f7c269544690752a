//! Pooled upstream forwarding with hop-by-hop header filtering.
//!
//! Grounded on the raw byte-forwarding helpers of a reverse proxy's primary
//! path: strip headers that don't survive a hop, let the HTTP client
//! recompute `content-length` itself, and otherwise forward verbatim.

use axum::http::HeaderMap;
use bytes::Bytes;

use gateway_core::error::GatewayError;

const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// Forwards `body` to `url`, copying every request header except hop-by-hop
/// ones, `content-length` (recomputed by the client from the actual body),
/// and `content-type` (set explicitly to `application/json`).
pub async fn forward(
    client: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    body: Bytes,
    timeout: std::time::Duration,
) -> Result<reqwest::Response, GatewayError> {
    let mut builder = client
        .post(url)
        .header("content-type", "application/json")
        .timeout(timeout)
        .body(body);

    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&lower.as_str()) {
            continue;
        }
        if lower == "content-type" || lower == "content-length" || lower == "x-target-url" {
            continue;
        }
        builder = builder.header(name, value);
    }

    Ok(builder.send().await?)
}

/// Maps an upstream response's status into `GatewayError` when it is a
/// server error (spec.md §7); client errors (4xx) are forwarded verbatim by
/// the caller, not converted into a `GatewayError`.
pub fn upstream_error_for_status(status: reqwest::StatusCode) -> Option<GatewayError> {
    if status.is_server_error() {
        Some(GatewayError::UpstreamServerError(
            status.as_u16(),
            status.canonical_reason().unwrap_or("upstream error").to_string(),
        ))
    } else {
        None
    }
}
