//! The tool-output pipe: the algorithmic core (spec.md §4.4). One instance
//! lives in each slot of the router's worker pool; instances are cheap —
//! state is a shadow store handle plus two boxed summarizers — so pooling
//! exists to bound concurrent summarizer HTTP calls, not to amortize setup.

use serde_json::Value;

use super::{CompressionRecord, MappingStatus, PipeContext, PipeOutcome};
use crate::adapter::CompressedResult;
use crate::config::ToolOutputPipeConfig;
use crate::error::GatewayError;
use crate::shadow::{new_shadow_id, ShadowStore};
use crate::summarizer::{SummarizeRequest, Summarizer};
use crate::util::make_sentinel;

pub struct ToolOutputPipe {
    store: ShadowStore,
    config: ToolOutputPipeConfig,
    primary: Box<dyn Summarizer>,
    fallback: Box<dyn Summarizer>,
}

impl ToolOutputPipe {
    pub fn new(
        store: ShadowStore,
        config: ToolOutputPipeConfig,
        primary: Box<dyn Summarizer>,
        fallback: Box<dyn Summarizer>,
    ) -> Self {
        Self {
            store,
            config,
            primary,
            fallback,
        }
    }

    /// Runs the full per-item decision table over one request body
    /// (spec.md §4.4). Processing is serial across the request's tool
    /// outputs, but `passthrough_last` is unconditional: the last item is
    /// never compressed regardless of what happened to earlier items
    /// (spec.md §8 scenario 5).
    pub async fn process(&self, ctx: PipeContext<'_>) -> Result<PipeOutcome, GatewayError> {
        if !self.config.enabled {
            return Ok(PipeOutcome {
                body: ctx.body.clone(),
                compressions: Vec::new(),
            });
        }

        let items = ctx.adapter.extract_tool_output(ctx.body)?;
        if items.is_empty() {
            return Ok(PipeOutcome {
                body: ctx.body.clone(),
                compressions: Vec::new(),
            });
        }

        let min_bytes = ctx.min_bytes_override.unwrap_or(self.config.min_bytes);
        let max_bytes = self.config.max_bytes;

        let mut results: Vec<CompressedResult> = Vec::new();
        let mut compressions: Vec<CompressionRecord> = Vec::new();
        let mut any_compressed = false;

        for item in &items {
            let n = item.content.len();

            let status = if n < min_bytes {
                MappingStatus::PassthroughSmall
            } else if n > max_bytes {
                MappingStatus::PassthroughLarge
            } else if item.is_last {
                MappingStatus::PassthroughLast
            } else if let Some(existing_id) = self.store.find_by_content(&item.content).await {
                results.push(CompressedResult {
                    id: item.id.clone(),
                    compressed: encode_cache_hit(&existing_id),
                });
                any_compressed = true;
                compressions.push(CompressionRecord {
                    id: item.id.clone(),
                    tool_name: item.tool_name.clone(),
                    status: MappingStatus::CacheHit,
                    shadow_id: Some(existing_id),
                    original_bytes: n,
                });
                continue;
            } else {
                let shadow_id = new_shadow_id();
                let compressed = self.summarize(&item.content, &item.tool_name, &ctx.user_query).await;
                self.store
                    .put(&shadow_id, &item.content, Some(item.tool_name.clone()), Some(item.id.clone()))
                    .await;
                results.push(CompressedResult {
                    id: item.id.clone(),
                    compressed: encode_compressed(&compressed, &shadow_id, self.config.include_expand_hint),
                });
                any_compressed = true;
                compressions.push(CompressionRecord {
                    id: item.id.clone(),
                    tool_name: item.tool_name.clone(),
                    status: MappingStatus::Compressed,
                    shadow_id: Some(shadow_id),
                    original_bytes: n,
                });
                continue;
            };

            compressions.push(CompressionRecord {
                id: item.id.clone(),
                tool_name: item.tool_name.clone(),
                status,
                shadow_id: None,
                original_bytes: n,
            });
        }

        let mut body = ctx.adapter.apply_tool_output(ctx.body, &results)?;

        if self.config.enable_expand_context && any_compressed {
            body = ctx.adapter.ensure_expand_tool_declared(&body)?;
        }

        Ok(PipeOutcome { body, compressions })
    }

    /// Summarizes via the primary strategy, falling back to the secondary
    /// strategy on failure for this item only (spec.md §4.4 "On any
    /// summarizer failure, the pipe falls back to passthrough for that item
    /// only and records the failure; it never aborts the whole request").
    async fn summarize(&self, original: &str, tool_name: &str, user_query: &str) -> String {
        let request = SummarizeRequest {
            original: original.to_string(),
            target_ratio: self.config.target_ratio,
            tool_name: tool_name.to_string(),
            user_query: user_query.to_string(),
        };

        match self.primary.summarize(request.clone()).await {
            Ok(compressed) => compressed,
            Err(err) => {
                tracing::warn!(error = %err, tool_name, "primary summarizer failed, falling back");
                match self.fallback.summarize(request).await {
                    Ok(compressed) => compressed,
                    Err(err) => {
                        tracing::warn!(error = %err, tool_name, "fallback summarizer also failed, using original");
                        original.to_string()
                    }
                }
            }
        }
    }
}

fn encode_compressed(compressed: &str, shadow_id: &str, include_hint: bool) -> String {
    let sentinel = make_sentinel(shadow_id);
    if include_hint {
        format!(
            "{compressed}\n\n[Output truncated. Call expand_context(shadow_id=\"{shadow_id}\") for the full content.] {sentinel}"
        )
    } else {
        format!("{compressed}\n{sentinel}")
    }
}

fn encode_cache_hit(shadow_id: &str) -> String {
    let sentinel = make_sentinel(shadow_id);
    format!(
        "[This output matches a previously compressed result. Call expand_context(shadow_id=\"{shadow_id}\") for the full content.] {sentinel}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::OpenAiChatAdapter;
    use crate::summarizer::PassthroughSummarizer;
    use serde_json::json;
    use std::time::Duration;

    fn pipe_with(config: ToolOutputPipeConfig) -> ToolOutputPipe {
        ToolOutputPipe::new(
            ShadowStore::new(Duration::from_secs(60)),
            config,
            Box::new(PassthroughSummarizer),
            Box::new(PassthroughSummarizer),
        )
    }

    fn body_with_tool(content: &str, is_last: bool, other_tool_content: Option<&str>) -> Value {
        let mut messages = vec![json!({"role": "user", "content": "q"})];
        if let Some(other) = other_tool_content {
            messages.push(json!({"role": "assistant", "tool_calls": [
                {"id": "call_0", "function": {"name": "earlier", "arguments": "{}"}}
            ]}));
            messages.push(json!({"role": "tool", "tool_call_id": "call_0", "content": other}));
        }
        messages.push(json!({"role": "assistant", "tool_calls": [
            {"id": "call_1", "function": {"name": "run_tests", "arguments": "{}"}}
        ]}));
        messages.push(json!({"role": "tool", "tool_call_id": "call_1", "content": content}));
        let _ = is_last;
        json!({"model": "gpt-4o", "messages": messages})
    }

    #[tokio::test]
    async fn small_content_passes_through_untouched() {
        let adapter = OpenAiChatAdapter;
        let pipe = pipe_with(ToolOutputPipeConfig {
            min_bytes: 300,
            ..Default::default()
        });
        let body = body_with_tool("{\"status\":\"ok\"}", true, None);
        let outcome = pipe
            .process(PipeContext {
                body: &body,
                adapter: &adapter,
                user_query: "q".into(),
                min_bytes_override: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.body, body);
        assert_eq!(outcome.compressions[0].status, MappingStatus::PassthroughSmall);
    }

    #[tokio::test]
    async fn sole_large_item_that_is_also_last_is_not_compressed() {
        let adapter = OpenAiChatAdapter;
        let pipe = pipe_with(ToolOutputPipeConfig {
            min_bytes: 10,
            ..Default::default()
        });
        let big = "x".repeat(5000);
        let body = body_with_tool(&big, true, None);
        let outcome = pipe
            .process(PipeContext {
                body: &body,
                adapter: &adapter,
                user_query: "".into(),
                min_bytes_override: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.compressions[0].status, MappingStatus::PassthroughLast);
        assert_eq!(outcome.body, body);
    }

    #[tokio::test]
    async fn earlier_eligible_item_is_compressed_and_last_still_preserved() {
        let adapter = OpenAiChatAdapter;
        let pipe = pipe_with(ToolOutputPipeConfig {
            min_bytes: 10,
            ..Default::default()
        });
        let earlier = "y".repeat(2000);
        let last = "z".repeat(2000);
        let body = body_with_tool(&last, true, Some(&earlier));
        let outcome = pipe
            .process(PipeContext {
                body: &body,
                adapter: &adapter,
                user_query: "".into(),
                min_bytes_override: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.compressions[0].status, MappingStatus::Compressed);
        assert_eq!(outcome.compressions[1].status, MappingStatus::PassthroughLast);
        let last_msg = outcome.body["messages"].as_array().unwrap().last().unwrap();
        assert_eq!(last_msg["content"], json!(last));
    }

    #[tokio::test]
    async fn duplicate_content_across_requests_is_a_cache_hit() {
        let adapter = OpenAiChatAdapter;
        let store = ShadowStore::new(Duration::from_secs(60));
        let pipe = ToolOutputPipe::new(
            store.clone(),
            ToolOutputPipeConfig {
                min_bytes: 10,
                ..Default::default()
            },
            Box::new(PassthroughSummarizer),
            Box::new(PassthroughSummarizer),
        );
        let payload = "w".repeat(2000);

        // First request: nothing to dedup against, so the sole/last item
        // passes through untouched and is never written to the store.
        let first_body = body_with_tool(&payload, true, None);
        pipe.process(PipeContext {
            body: &first_body,
            adapter: &adapter,
            user_query: "".into(),
            min_bytes_override: None,
        })
        .await
        .unwrap();
        assert_eq!(store.len().await, 0);

        // Seed the store directly to simulate an earlier request's
        // compression of this exact content under a known id.
        store.put("shadow_seed000000", &payload, None, None).await;

        let second_body = body_with_tool(&payload, true, Some(&"other".repeat(50)));
        let outcome = pipe
            .process(PipeContext {
                body: &second_body,
                adapter: &adapter,
                user_query: "".into(),
                min_bytes_override: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.compressions[1].status, MappingStatus::CacheHit);
        assert_eq!(outcome.compressions[1].shadow_id.as_deref(), Some("shadow_seed000000"));
    }

    #[tokio::test]
    async fn compressing_declares_the_expand_tool_exactly_once() {
        let adapter = OpenAiChatAdapter;
        let pipe = pipe_with(ToolOutputPipeConfig {
            min_bytes: 10,
            ..Default::default()
        });
        let earlier = "y".repeat(2000);
        let last = "z".repeat(2000);
        let body = body_with_tool(&last, true, Some(&earlier));
        let outcome = pipe
            .process(PipeContext {
                body: &body,
                adapter: &adapter,
                user_query: "".into(),
                min_bytes_override: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.body["tools"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_pipe_is_a_pure_passthrough() {
        let adapter = OpenAiChatAdapter;
        let pipe = pipe_with(ToolOutputPipeConfig {
            enabled: false,
            ..Default::default()
        });
        let body = body_with_tool(&"x".repeat(5000), true, None);
        let outcome = pipe
            .process(PipeContext {
                body: &body,
                adapter: &adapter,
                user_query: "".into(),
                min_bytes_override: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.body, body);
        assert!(outcome.compressions.is_empty());
    }
}
