//! The gateway handler: end-to-end orchestration (spec.md §4.5).

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use gateway_core::adapter::{Adapter, ProviderTag};
use gateway_core::error::GatewayError;
use gateway_core::util::{find_sentinels, parse_compression_threshold};

use crate::state::AppState;

/// SPEC_FULL.md-level choice: which route the request arrived on, used both
/// for default provider detection and for which upstream path to forward
/// to when the target is given only as a base URL.
#[derive(Clone, Copy)]
pub struct RouteInfo {
    pub default_provider: ProviderTag,
    pub upstream_path: &'static str,
}

pub async fn handle(state: AppState, route: RouteInfo, headers: HeaderMap, body: Bytes) -> Response {
    match process(state, route, headers, body).await {
        Ok(response) => response,
        Err(err) => error_response(&err),
    }
}

async fn process(
    state: AppState,
    route: RouteInfo,
    headers: HeaderMap,
    raw_body: Bytes,
) -> Result<Response, GatewayError> {
    if raw_body.len() > state.config.server.max_body_bytes {
        return Err(GatewayError::ClientError("request body exceeds max_body_bytes".into()));
    }

    let body: Value = serde_json::from_slice(&raw_body)?;

    let provider = resolve_provider(&headers, route.default_provider);
    let adapter = state.registry.get(provider);

    if let Some(auth) = headers
        .get("authorization")
        .or_else(|| headers.get("x-api-key"))
        .and_then(|v| v.to_str().ok())
    {
        state.captured_auth.capture_if_absent(auth).await;
    }

    let target_base = resolve_target_base(&headers, &state, provider)?;
    let target_url = format!("{}{}", target_base.trim_end_matches('/'), route.upstream_path);

    let min_bytes_override = headers
        .get("x-compression-threshold")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_compression_threshold)
        .flatten();

    let user_query = adapter.extract_user_query(&body);

    let routed_body = match state
        .router
        .route(adapter, &body, user_query, min_bytes_override)
        .await
    {
        Ok(outcome) => outcome.body,
        Err(err) => {
            tracing::warn!(error = %err, "router/pipe failed, forwarding original body");
            body.clone()
        }
    };

    let is_streaming = routed_body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let forward_body = Bytes::from(serde_json::to_vec(&routed_body)?);
    let upstream = crate::http_client::forward(
        &state.http_client,
        &target_url,
        &headers,
        forward_body,
        state.config.server.write_timeout(),
    )
    .await?;

    if let Some(err) = crate::http_client::upstream_error_for_status(upstream.status()) {
        return Err(err);
    }

    if is_streaming {
        return Ok(stream_response(upstream));
    }

    run_expand_loop(&state, adapter, &target_url, &headers, &routed_body, upstream).await
}

/// Bounded expand-loop state machine (spec.md §4.5/§9): Forwarding ->
/// AwaitingExpand -> Done, capped by `max_expand_loops`.
async fn run_expand_loop(
    state: &AppState,
    adapter: &dyn gateway_core::adapter::Adapter,
    target_url: &str,
    headers: &HeaderMap,
    original_body: &Value,
    mut upstream: reqwest::Response,
) -> Result<Response, GatewayError> {
    let status = upstream.status();
    let response_headers = upstream.headers().clone();
    let mut response_body: Value = upstream.json().await?;

    let mut conversation_body = original_body.clone();
    let max_loops = state.config.server.max_expand_loops;

    for _ in 0..max_loops {
        let expand_ids = adapter.detect_expand_call(&response_body);
        if expand_ids.is_empty() {
            break;
        }

        for shadow_id in expand_ids {
            let content = match state.store.get(&shadow_id).await {
                Some(content) => content,
                None => format!("Error: shadow_id '{}' not found or expired", shadow_id),
            };
            conversation_body =
                adapter.inject_expand_result(&conversation_body, &response_body, &shadow_id, &content)?;
        }

        let body_bytes = Bytes::from(serde_json::to_vec(&conversation_body)?);
        upstream = crate::http_client::forward(
            &state.http_client,
            target_url,
            headers,
            body_bytes,
            state.config.server.write_timeout(),
        )
        .await?;

        if let Some(err) = crate::http_client::upstream_error_for_status(upstream.status()) {
            return Err(err);
        }

        response_body = upstream.json().await?;
    }

    let final_body = adapter.strip_expand_from_response(&response_body)?;
    let bytes = serde_json::to_vec(&final_body)?;
    debug_assert!(
        find_sentinels(std::str::from_utf8(&bytes).unwrap_or("")).is_empty(),
        "final response must never leak a shadow sentinel"
    );

    let mut response = Response::builder().status(status.as_u16());
    for (name, value) in response_headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "content-length" || lower == "transfer-encoding" || lower == "connection" {
            continue;
        }
        response = response.header(name.as_str(), value.as_bytes());
    }
    Ok(response
        .body(axum::body::Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

/// Streaming responses bypass the expand loop entirely and are forwarded
/// byte-for-byte (spec.md §4.5 step 7, §8 "Streaming bypass").
fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status().as_u16();
    let headers = upstream.headers().clone();
    let stream = upstream.bytes_stream();

    let mut response = Response::builder().status(status);
    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "content-length" || lower == "transfer-encoding" || lower == "connection" {
            continue;
        }
        response = response.header(name.as_str(), value.as_bytes());
    }
    response
        .body(axum::body::Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn resolve_provider(headers: &HeaderMap, default: ProviderTag) -> ProviderTag {
    headers
        .get("x-provider")
        .and_then(|v| v.to_str().ok())
        .and_then(ProviderTag::from_header)
        .unwrap_or(default)
}

/// Resolves and SSRF-validates the upstream base URL (spec.md §6, §8
/// scenario 6). `X-Target-URL` wins, then the configured default, then the
/// provider's own public API.
fn resolve_target_base(headers: &HeaderMap, state: &AppState, provider: ProviderTag) -> Result<String, GatewayError> {
    let candidate = headers
        .get("x-target-url")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| state.config.ssrf.default_target_url.clone())
        .unwrap_or_else(|| default_provider_base(provider).to_string());

    let parsed = url::Url::parse(&candidate)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| GatewayError::ClientError("target URL has no host".into()))?;

    let allowed = state
        .config
        .ssrf
        .allowed_hosts
        .iter()
        .any(|h| h.eq_ignore_ascii_case(host));
    if !allowed {
        return Err(GatewayError::ForbiddenTarget(host.to_string()));
    }

    Ok(candidate)
}

fn default_provider_base(provider: ProviderTag) -> &'static str {
    match provider {
        ProviderTag::Anthropic => "https://api.anthropic.com",
        ProviderTag::OpenAiChat | ProviderTag::OpenAiResponses => "https://api.openai.com",
    }
}

fn error_response(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, axum::Json(serde_json::json!({ "error": err.to_string() }))).into_response();
    if matches!(err, GatewayError::RateLimited) {
        response
            .headers_mut()
            .insert("retry-after", axum::http::HeaderValue::from_static("1"));
    }
    response
}
