use std::sync::Arc;
use std::time::Duration;

use gateway_core::adapter::AdapterRegistry;
use gateway_core::auth_capture::CapturedAuth;
use gateway_core::config::GatewayConfig;
use gateway_core::pipe::ToolOutputPipe;
use gateway_core::pool::Pool;
use gateway_core::ratelimit::RateLimiter;
use gateway_core::router::Router;
use gateway_core::shadow::ShadowStore;
use gateway_core::summarizer::build_summarizer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<AdapterRegistry>,
    pub router: Arc<Router>,
    pub store: ShadowStore,
    pub rate_limiter: Arc<RateLimiter>,
    pub http_client: reqwest::Client,
    pub captured_auth: CapturedAuth,
}

impl AppState {
    pub fn build(config: GatewayConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .build()?;

        let store = ShadowStore::new(config.store.ttl());
        store.spawn_sweeper(Duration::from_secs(60));

        let captured_auth = CapturedAuth::new();

        let pipe_config = config.pipes.tool_output.clone();
        let mut pipes = Vec::with_capacity(pipe_config.pool_size.max(1));
        for _ in 0..pipe_config.pool_size.max(1) {
            let primary = build_summarizer(
                pipe_config.strategy,
                http_client.clone(),
                pipe_config.summarizer_url.as_deref(),
                pipe_config.summarizer_api_key.as_deref(),
                pipe_config.summarizer_timeout(),
                captured_auth.clone(),
            );
            let fallback = build_summarizer(
                pipe_config.fallback_strategy,
                http_client.clone(),
                pipe_config.summarizer_url.as_deref(),
                pipe_config.summarizer_api_key.as_deref(),
                pipe_config.summarizer_timeout(),
                captured_auth.clone(),
            );
            pipes.push(ToolOutputPipe::new(
                store.clone(),
                pipe_config.clone(),
                primary,
                fallback,
            ));
        }

        let router = Router::new(Pool::new(pipes));

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.rate,
            config.rate_limit.max_buckets,
            Duration::from_secs(config.rate_limit.stale_after_secs),
        ));
        rate_limiter
            .clone()
            .spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs));

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(AdapterRegistry::default()),
            router: Arc::new(router),
            store,
            rate_limiter,
            http_client,
            captured_auth,
        })
    }
}
