//! Strategy (a): a dedicated compression HTTP service (primary).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SummarizeRequest, Summarizer};
use crate::error::GatewayError;

#[derive(Serialize)]
struct ApiRequest<'a> {
    original: &'a str,
    target_ratio: f32,
    tool_name: &'a str,
    user_query: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    compressed: String,
}

pub struct ApiSummarizer {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    api_key: Option<String>,
}

impl ApiSummarizer {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[async_trait]
impl Summarizer for ApiSummarizer {
    async fn summarize(&self, request: SummarizeRequest) -> Result<String, GatewayError> {
        let payload = ApiRequest {
            original: &request.original,
            target_ratio: request.target_ratio,
            tool_name: &request.tool_name,
            user_query: &request.user_query,
        };

        let mut builder = self.client.post(&self.url).json(&payload).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(GatewayError::PipeError(format!(
                "summarizer service returned {}",
                response.status()
            )));
        }

        let parsed: ApiResponse = response.json().await?;
        Ok(parsed.compressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn calls_the_configured_endpoint_and_parses_the_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "compressed": "short summary"
            })))
            .mount(&server)
            .await;

        let summarizer = ApiSummarizer::new(
            reqwest::Client::new(),
            format!("{}/compress", server.uri()),
            Duration::from_secs(5),
        );

        let result = summarizer
            .summarize(SummarizeRequest {
                original: "a very long log".into(),
                target_ratio: 0.2,
                tool_name: "run_tests".into(),
                user_query: "what failed?".into(),
            })
            .await
            .unwrap();

        assert_eq!(result, "short summary");
    }

    #[tokio::test]
    async fn configured_api_key_is_sent_as_a_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compress"))
            .and(header("authorization", "Bearer s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "compressed": "short summary"
            })))
            .mount(&server)
            .await;

        let summarizer = ApiSummarizer::new(
            reqwest::Client::new(),
            format!("{}/compress", server.uri()),
            Duration::from_secs(5),
        )
        .with_api_key(Some("s3cr3t".to_string()));

        let result = summarizer
            .summarize(SummarizeRequest {
                original: "a very long log".into(),
                target_ratio: 0.2,
                tool_name: "run_tests".into(),
                user_query: "what failed?".into(),
            })
            .await
            .unwrap();

        assert_eq!(result, "short summary");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compress"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let summarizer = ApiSummarizer::new(
            reqwest::Client::new(),
            format!("{}/compress", server.uri()),
            Duration::from_secs(5),
        );

        let result = summarizer
            .summarize(SummarizeRequest {
                original: "x".into(),
                target_ratio: 0.2,
                tool_name: "t".into(),
                user_query: "".into(),
            })
            .await;

        assert!(result.is_err());
    }
}
