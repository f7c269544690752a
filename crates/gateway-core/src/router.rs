//! Content-based router (spec.md §4.3). Inspects the body via the
//! resolved adapter and dispatches to the matching pipe's worker pool.
//! Pool release is guaranteed by `PooledGuard`'s `Drop` impl on every exit
//! path, including the `?` early return on a pipe error.

use serde_json::Value;

use crate::adapter::Adapter;
use crate::error::GatewayError;
use crate::pipe::{CompressionRecord, PipeContext, ToolOutputPipe};
use crate::pool::Pool;

/// Priority order matters: whenever a body carries both tool outputs and
/// tool definitions, `ToolOutput` wins (spec.md §8 "Router priority").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeChoice {
    None,
    ToolOutput,
    ToolDiscovery,
}

pub struct Router {
    tool_output_pool: Pool<ToolOutputPipe>,
}

/// Outcome of routing one request: the (possibly rewritten) body and the
/// compression decisions made, if any pipe ran.
pub struct RouteOutcome {
    pub body: Value,
    pub choice: PipeChoice,
    pub compressions: Vec<CompressionRecord>,
}

impl Router {
    pub fn new(tool_output_pool: Pool<ToolOutputPipe>) -> Self {
        Self { tool_output_pool }
    }

    fn choose(&self, adapter: &dyn Adapter, body: &Value) -> Result<PipeChoice, GatewayError> {
        if !adapter.extract_tool_output(body)?.is_empty() {
            return Ok(PipeChoice::ToolOutput);
        }
        if !adapter.extract_tool_discovery(body)?.is_empty() {
            return Ok(PipeChoice::ToolDiscovery);
        }
        Ok(PipeChoice::None)
    }

    pub async fn route(
        &self,
        adapter: &dyn Adapter,
        body: &Value,
        user_query: String,
        min_bytes_override: Option<usize>,
    ) -> Result<RouteOutcome, GatewayError> {
        let choice = self.choose(adapter, body)?;

        match choice {
            PipeChoice::ToolOutput => {
                let guard = self.tool_output_pool.acquire().await;
                let outcome = guard
                    .process(PipeContext {
                        body,
                        adapter,
                        user_query,
                        min_bytes_override,
                    })
                    .await?;
                Ok(RouteOutcome {
                    body: outcome.body,
                    choice,
                    compressions: outcome.compressions,
                })
            }
            // Tool discovery extraction is a stub (spec.md §4.2); there is
            // nothing yet to rewrite for it.
            PipeChoice::ToolDiscovery | PipeChoice::None => Ok(RouteOutcome {
                body: body.clone(),
                choice,
                compressions: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::OpenAiChatAdapter;
    use crate::config::ToolOutputPipeConfig;
    use crate::shadow::ShadowStore;
    use crate::summarizer::PassthroughSummarizer;
    use serde_json::json;
    use std::time::Duration;

    fn router() -> Router {
        let pipe = ToolOutputPipe::new(
            ShadowStore::new(Duration::from_secs(60)),
            ToolOutputPipeConfig::default(),
            Box::new(PassthroughSummarizer),
            Box::new(PassthroughSummarizer),
        );
        Router::new(Pool::new(vec![pipe]))
    }

    #[tokio::test]
    async fn tool_output_takes_priority_over_tool_discovery() {
        let adapter = OpenAiChatAdapter;
        let body = json!({
            "model": "gpt-4o",
            "tools": [{"type": "function", "function": {"name": "run_tests"}}],
            "messages": [
                {"role": "user", "content": "go"},
                {"role": "assistant", "tool_calls": [{"id": "call_1", "function": {"name": "run_tests", "arguments": "{}"}}]},
                {"role": "tool", "tool_call_id": "call_1", "content": "ok"}
            ]
        });
        let outcome = router()
            .route(&adapter, &body, "go".into(), None)
            .await
            .unwrap();
        assert_eq!(outcome.choice, PipeChoice::ToolOutput);
    }

    #[tokio::test]
    async fn no_tools_at_all_routes_to_none() {
        let adapter = OpenAiChatAdapter;
        let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
        let outcome = router()
            .route(&adapter, &body, "hi".into(), None)
            .await
            .unwrap();
        assert_eq!(outcome.choice, PipeChoice::None);
        assert_eq!(outcome.body, body);
    }

    #[tokio::test]
    async fn only_tool_definitions_routes_to_discovery() {
        let adapter = OpenAiChatAdapter;
        let body = json!({
            "model": "gpt-4o",
            "tools": [{"type": "function", "function": {"name": "run_tests"}}],
            "messages": [{"role": "user", "content": "hi"}]
        });
        let outcome = router()
            .route(&adapter, &body, "hi".into(), None)
            .await
            .unwrap();
        assert_eq!(outcome.choice, PipeChoice::ToolDiscovery);
    }
}
