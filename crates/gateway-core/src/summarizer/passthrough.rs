//! Strategy (c) and the universal fallback: no compression at all. Used
//! when no summarizer is configured, or when another strategy fails for a
//! single item (spec.md §4.4 "summarizer failure falls back to passthrough
//! for that item only").

use async_trait::async_trait;

use super::{SummarizeRequest, Summarizer};
use crate::error::GatewayError;

pub struct PassthroughSummarizer;

#[async_trait]
impl Summarizer for PassthroughSummarizer {
    async fn summarize(&self, request: SummarizeRequest) -> Result<String, GatewayError> {
        Ok(request.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_input_unchanged() {
        let result = PassthroughSummarizer
            .summarize(SummarizeRequest {
                original: "unchanged".into(),
                target_ratio: 0.1,
                tool_name: "t".into(),
                user_query: "".into(),
            })
            .await
            .unwrap();
        assert_eq!(result, "unchanged");
    }
}
