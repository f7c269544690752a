//! Pluggable compression oracle (spec.md §4.4 "Summarization call"). The
//! summarizer itself — a dedicated HTTP service or an LLM — is an external
//! collaborator (spec.md §1 Out of scope); this module is the client-side
//! contract plus the three selectable strategies.

mod api;
mod llm;
mod passthrough;

pub use api::ApiSummarizer;
pub use llm::LlmSummarizer;
pub use passthrough::PassthroughSummarizer;

use async_trait::async_trait;

use crate::auth_capture::CapturedAuth;
use crate::config::SummarizerStrategy;
use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct SummarizeRequest {
    pub original: String,
    pub target_ratio: f32,
    pub tool_name: String,
    pub user_query: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: SummarizeRequest) -> Result<String, GatewayError>;
}

/// Picks the configured strategy, falling back to a different one on
/// request (spec.md §4.4: on summarizer failure the pipe falls back to
/// `passthrough` for that item only).
pub fn build_summarizer(
    strategy: SummarizerStrategy,
    client: reqwest::Client,
    summarizer_url: Option<&str>,
    summarizer_api_key: Option<&str>,
    timeout: std::time::Duration,
    auth: CapturedAuth,
) -> Box<dyn Summarizer> {
    match strategy {
        SummarizerStrategy::Api => match summarizer_url {
            Some(url) => Box::new(
                ApiSummarizer::new(client, url.to_string(), timeout)
                    .with_api_key(summarizer_api_key.map(str::to_string)),
            ),
            None => Box::new(PassthroughSummarizer),
        },
        SummarizerStrategy::Llm => Box::new(LlmSummarizer::new(client, timeout).with_auth(auth)),
        SummarizerStrategy::Passthrough => Box::new(PassthroughSummarizer),
    }
}
