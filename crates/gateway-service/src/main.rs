mod handler;
mod http_client;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, options, post};
use axum::{Json, Router};
use clap::Parser;
use gateway_core::adapter::ProviderTag;
use gateway_core::config::GatewayConfig;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::handler::RouteInfo;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Context Gateway: a compressing reverse proxy for LLM providers")]
struct Args {
    /// Address to bind the service to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,
    /// Path to a context-gateway.toml config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the tracing env-filter, e.g. "gateway_service=debug".
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = args
        .log_filter
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("gateway_service=info,tower_http=info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = GatewayConfig::load(args.config.as_deref())?;
    let port_from_config = config.server.port;
    let state = AppState::build(config)?;

    info!(addr = %args.addr, port = port_from_config, "starting context-gateway");

    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    let body_limit = state.config.server.max_body_bytes;

    let app = Router::new()
        .route("/v1/messages", post(handle_anthropic))
        .route("/v1/chat/completions", post(handle_openai_chat))
        .route("/v1/responses", post(handle_openai_responses))
        .route("/health", get(health))
        .route("/*any", options(preflight))
        // Innermost first: security/CORS -> logging -> rate-limit ->
        // panic-recovery outermost (spec.md §4.6 chain, reversed because
        // each `.layer()` call wraps everything added before it).
        .layer(axum::middleware::from_fn(crate::middleware::security_headers))
        .layer(cors)
        .layer(axum::middleware::from_fn(crate::middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit,
        ))
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

const ANTHROPIC_ROUTE: RouteInfo = RouteInfo {
    default_provider: ProviderTag::Anthropic,
    upstream_path: "/v1/messages",
};
const OPENAI_CHAT_ROUTE: RouteInfo = RouteInfo {
    default_provider: ProviderTag::OpenAiChat,
    upstream_path: "/v1/chat/completions",
};
const OPENAI_RESPONSES_ROUTE: RouteInfo = RouteInfo {
    default_provider: ProviderTag::OpenAiResponses,
    upstream_path: "/v1/responses",
};

async fn handle_anthropic(State(state): State<AppState>, headers: HeaderMap, body: bytes::Bytes) -> impl IntoResponse {
    handler::handle(state, ANTHROPIC_ROUTE, headers, body).await
}

async fn handle_openai_chat(State(state): State<AppState>, headers: HeaderMap, body: bytes::Bytes) -> impl IntoResponse {
    handler::handle(state, OPENAI_CHAT_ROUTE, headers, body).await
}

async fn handle_openai_responses(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> impl IntoResponse {
    handler::handle(state, OPENAI_RESPONSES_ROUTE, headers, body).await
}
