//! Strategy (b): a direct LLM call used as a compressor, via the captured
//! request credential rather than a dedicated compression service.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::{SummarizeRequest, Summarizer};
use crate::auth_capture::CapturedAuth;
use crate::error::GatewayError;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct LlmSummarizer {
    client: reqwest::Client,
    timeout: Duration,
    endpoint: String,
    model: String,
    auth: CapturedAuth,
}

impl LlmSummarizer {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            auth: CapturedAuth::new(),
        }
    }

    pub fn with_auth(mut self, auth: CapturedAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, request: SummarizeRequest) -> Result<String, GatewayError> {
        let auth = self.auth.get().await.ok_or_else(|| {
            GatewayError::PipeError("llm summarizer strategy has no captured credential yet".into())
        })?;

        let target_chars = ((request.original.len() as f32) * request.target_ratio).max(64.0) as usize;
        let prompt = format!(
            "Summarize the following output of tool '{}' in roughly {} characters, \
             preserving anything relevant to the user's question: {:?}.\n\n{}",
            request.tool_name, target_chars, request.user_query, request.original
        );

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": (target_chars / 3).max(32),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", auth)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::PipeError(format!(
                "llm summarizer upstream returned {}",
                response.status()
            )));
        }

        let parsed: serde_json::Value = response.json().await?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| GatewayError::PipeError("llm summarizer response had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn errors_without_a_captured_credential() {
        let summarizer = LlmSummarizer::new(reqwest::Client::new(), Duration::from_secs(5));
        let result = summarizer
            .summarize(SummarizeRequest {
                original: "x".repeat(1000),
                target_ratio: 0.2,
                tool_name: "t".into(),
                user_query: "".into(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn uses_the_captured_credential_and_parses_the_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "compact summary"}}]
            })))
            .mount(&server)
            .await;

        let auth = CapturedAuth::new();
        auth.capture_if_absent("Bearer captured-token").await;

        let summarizer = LlmSummarizer::new(reqwest::Client::new(), Duration::from_secs(5))
            .with_auth(auth)
            .with_endpoint(server.uri(), "gpt-4o-mini");

        let result = summarizer
            .summarize(SummarizeRequest {
                original: "a".repeat(2000),
                target_ratio: 0.1,
                tool_name: "run_tests".into(),
                user_query: "why did it fail?".into(),
            })
            .await
            .unwrap();

        assert_eq!(result, "compact summary");
    }
}
