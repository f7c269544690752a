//! Gateway configuration (SPEC_FULL.md §4.0). TOML on disk, overridable by
//! a small set of environment variables, `deny_unknown_fields` throughout
//! to catch typos the way the teacher's provider configs do (`ProxyConfig`
//! in `qmt-proxy`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::GatewayError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub pipes: PipesConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub ssrf: SsrfConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            pipes: PipesConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            ssrf: SsrfConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub port: u16,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub max_expand_loops: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            max_body_bytes: 25 * 1024 * 1024,
            max_expand_loops: 3,
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    /// Only `"memory"` is supported; kept as a field so a future on-disk
    /// store can be selected without a breaking config change.
    #[serde(rename = "type")]
    pub store_type: String,
    pub ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: "memory".to_string(),
            ttl_secs: 30 * 60,
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizerStrategy {
    Api,
    Llm,
    Passthrough,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolOutputPipeConfig {
    pub enabled: bool,
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub target_ratio: f32,
    pub strategy: SummarizerStrategy,
    pub fallback_strategy: SummarizerStrategy,
    pub include_expand_hint: bool,
    pub enable_expand_context: bool,
    pub pool_size: usize,
    pub summarizer_url: Option<String>,
    pub summarizer_api_key: Option<String>,
    pub summarizer_timeout_secs: u64,
}

impl Default for ToolOutputPipeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bytes: 500,
            max_bytes: 200 * 1024,
            target_ratio: 0.2,
            strategy: SummarizerStrategy::Api,
            fallback_strategy: SummarizerStrategy::Passthrough,
            include_expand_hint: true,
            enable_expand_context: true,
            pool_size: 10,
            summarizer_url: None,
            summarizer_api_key: None,
            summarizer_timeout_secs: 10,
        }
    }
}

impl ToolOutputPipeConfig {
    pub fn summarizer_timeout(&self) -> Duration {
        Duration::from_secs(self.summarizer_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipesConfig {
    pub tool_output: ToolOutputPipeConfig,
}

impl Default for PipesConfig {
    fn default() -> Self {
        Self {
            tool_output: ToolOutputPipeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    pub rate: f64,
    pub max_buckets: usize,
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 20.0,
            max_buckets: 10_000,
            stale_after_secs: 10 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SsrfConfig {
    /// Hostnames an `X-Target-URL` is allowed to resolve to. Empty means
    /// "use the built-in provider defaults" (see `default_allowlist`).
    pub allowed_hosts: Vec<String>,
    pub default_target_url: Option<String>,
}

impl Default for SsrfConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowlist(),
            default_target_url: None,
        }
    }
}

fn default_allowlist() -> Vec<String> {
    vec![
        "api.openai.com".to_string(),
        "api.anthropic.com".to_string(),
    ]
}

impl GatewayConfig {
    /// Loads config from `path` if given, else from `./context-gateway.toml`
    /// if present, else built-in defaults — then applies environment
    /// overrides for the two documented variables.
    pub fn load(path: Option<&Path>) -> Result<GatewayConfig, GatewayError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new("context-gateway.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    GatewayConfig::default()
                }
            }
        };

        if let Ok(port) = std::env::var("CONTEXT_GATEWAY_PORT") {
            cfg.server.port = port
                .parse()
                .map_err(|_| GatewayError::ClientError("CONTEXT_GATEWAY_PORT must be a u16".into()))?;
        }
        if let Ok(url) = std::env::var("CONTEXT_GATEWAY_SUMMARIZER_URL") {
            cfg.pipes.tool_output.summarizer_url = Some(url);
        }
        if let Ok(key) = std::env::var("CONTEXT_GATEWAY_SUMMARIZER_API_KEY") {
            cfg.pipes.tool_output.summarizer_api_key = Some(key);
        }

        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<GatewayConfig, GatewayError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::ClientError(format!("reading {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| GatewayError::ClientError(format!("parsing {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.store.store_type, "memory");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad = "not_a_real_key = true";
        let result: Result<GatewayConfig, _> = toml::from_str(bad);
        assert!(result.is_err());
    }

    #[test]
    fn minimal_toml_uses_defaults_for_absent_sections() {
        let text = r#"
            [server]
            port = 9090
        "#;
        let cfg: GatewayConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.pipes.tool_output.min_bytes, 500);
    }
}
