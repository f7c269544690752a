//! Anthropic Messages adapter. Tool outputs are `tool_result` content
//! blocks inside a user message; names live on the prior assistant
//! message's `tool_use` blocks, keyed by `tool_use_id`.

use serde_json::{json, Value};

use super::{Adapter, CompressedResult, ExtractedTool, ExtractedToolOutput, ProviderTag, EXPAND_CONTEXT_TOOL_NAME};
use crate::error::GatewayError;

pub struct AnthropicAdapter;

fn messages(body: &Value) -> Result<&Vec<Value>, GatewayError> {
    body.get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::AdapterError("missing messages array".into()))
}

fn content_blocks(message: &Value) -> Vec<Value> {
    match message.get("content") {
        Some(Value::Array(blocks)) => blocks.clone(),
        Some(Value::String(s)) => vec![json!({"type": "text", "text": s})],
        _ => Vec::new(),
    }
}

fn tool_result_text(block: &Value) -> String {
    match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn tool_name_for_use_id(messages: &[Value], tool_use_id: &str) -> String {
    for msg in messages.iter().rev() {
        for block in content_blocks(msg) {
            if block.get("type").and_then(Value::as_str) == Some("tool_use")
                && block.get("id").and_then(Value::as_str) == Some(tool_use_id)
            {
                return block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
            }
        }
    }
    String::new()
}

impl Adapter for AnthropicAdapter {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Anthropic
    }

    fn extract_tool_output(&self, body: &Value) -> Result<Vec<ExtractedToolOutput>, GatewayError> {
        let msgs = messages(body)?;
        let mut locations = Vec::new();
        for (m_idx, msg) in msgs.iter().enumerate() {
            for (b_idx, block) in content_blocks(msg).iter().enumerate() {
                if block.get("type").and_then(Value::as_str) == Some("tool_result") {
                    locations.push((m_idx, b_idx, block.clone()));
                }
            }
        }

        let mut out = Vec::with_capacity(locations.len());
        for (pos, (m_idx, b_idx, block)) in locations.iter().enumerate() {
            let id = block
                .get("tool_use_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            out.push(ExtractedToolOutput {
                tool_name: tool_name_for_use_id(&msgs[..*m_idx], &id),
                content: tool_result_text(block),
                id,
                message_index: *m_idx,
                block_index: *b_idx,
                is_last: pos + 1 == locations.len(),
            });
        }
        Ok(out)
    }

    fn extract_tool_discovery(&self, body: &Value) -> Result<Vec<ExtractedTool>, GatewayError> {
        let tools = body
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(tools
            .iter()
            .filter_map(|t| t.get("name")?.as_str())
            .map(|name| ExtractedTool { name: name.to_string() })
            .collect())
    }

    fn apply_tool_output(
        &self,
        body: &Value,
        results: &[CompressedResult],
    ) -> Result<Value, GatewayError> {
        let mut out = body.clone();
        let msgs = out
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| GatewayError::AdapterError("missing messages array".into()))?;

        for msg in msgs.iter_mut() {
            let Some(blocks) = msg.get_mut("content").and_then(Value::as_array_mut) else {
                continue;
            };
            for block in blocks.iter_mut() {
                if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                    continue;
                }
                let tool_use_id = block.get("tool_use_id").and_then(Value::as_str).unwrap_or("");
                if let Some(result) = results.iter().find(|r| r.id == tool_use_id) {
                    block["content"] = json!(result.compressed);
                }
            }
        }
        Ok(out)
    }

    fn extract_user_query(&self, body: &Value) -> String {
        let msgs = match messages(body) {
            Ok(m) => m.as_slice(),
            Err(_) => return String::new(),
        };
        msgs.iter()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .map(|m| {
                content_blocks(m)
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    fn detect_expand_call(&self, response: &Value) -> Vec<String> {
        let blocks = response
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        blocks
            .iter()
            .filter(|b| {
                b.get("type").and_then(Value::as_str) == Some("tool_use")
                    && b.get("name").and_then(Value::as_str) == Some(EXPAND_CONTEXT_TOOL_NAME)
            })
            .filter_map(|b| b.get("input")?.get("shadow_id")?.as_str().map(String::from))
            .collect()
    }

    fn inject_expand_result(
        &self,
        body: &Value,
        response: &Value,
        shadow_id: &str,
        content: &str,
    ) -> Result<Value, GatewayError> {
        let mut out = body.clone();
        let msgs = out
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| GatewayError::AdapterError("missing messages array".into()))?;

        let response_blocks = response
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let tool_use_id = response_blocks
            .iter()
            .find(|b| {
                b.get("type").and_then(Value::as_str) == Some("tool_use")
                    && b.get("input")
                        .and_then(|i| i.get("shadow_id"))
                        .and_then(Value::as_str)
                        == Some(shadow_id)
            })
            .and_then(|b| b.get("id"))
            .and_then(Value::as_str)
            .unwrap_or("expand_call")
            .to_string();

        msgs.push(json!({"role": "assistant", "content": response_blocks}));
        msgs.push(json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
            }]
        }));
        Ok(out)
    }

    fn ensure_expand_tool_declared(&self, body: &Value) -> Result<Value, GatewayError> {
        let mut out = body.clone();
        let tools = out
            .as_object_mut()
            .ok_or_else(|| GatewayError::AdapterError("body is not an object".into()))?
            .entry("tools")
            .or_insert_with(|| json!([]));

        let tools_arr = tools
            .as_array_mut()
            .ok_or_else(|| GatewayError::AdapterError("tools is not an array".into()))?;

        let already_declared = tools_arr
            .iter()
            .any(|t| t.get("name").and_then(Value::as_str) == Some(EXPAND_CONTEXT_TOOL_NAME));
        if !already_declared {
            tools_arr.push(expand_tool_definition());
        }
        Ok(out)
    }

    fn strip_expand_from_response(&self, response: &Value) -> Result<Value, GatewayError> {
        let mut out = response.clone();
        if let Some(blocks) = out.get_mut("content").and_then(Value::as_array_mut) {
            blocks.retain(|b| {
                !(b.get("type").and_then(Value::as_str) == Some("tool_use")
                    && b.get("name").and_then(Value::as_str) == Some(EXPAND_CONTEXT_TOOL_NAME))
            });
        }
        Ok(out)
    }
}

fn expand_tool_definition() -> Value {
    json!({
        "name": EXPAND_CONTEXT_TOOL_NAME,
        "description": "Fetch the full original content behind a shadow reference emitted in a compressed tool result.",
        "input_schema": {
            "type": "object",
            "properties": {
                "shadow_id": { "type": "string" }
            },
            "required": ["shadow_id"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> Value {
        json!({
            "model": "claude-3-7-sonnet",
            "messages": [
                {"role": "user", "content": "run the tests"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "run_tests", "input": {}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "{\"status\":\"ok\"}"}
                ]}
            ]
        })
    }

    #[test]
    fn extracts_tool_result_block() {
        let adapter = AnthropicAdapter;
        let out = adapter.extract_tool_output(&sample_body()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "toolu_1");
        assert_eq!(out[0].tool_name, "run_tests");
        assert_eq!(out[0].message_index, 2);
        assert_eq!(out[0].block_index, 0);
        assert!(out[0].is_last);
    }

    #[test]
    fn three_blocks_last_tool_rule_by_size_is_pipe_concern_not_adapter() {
        // The adapter only reports positions/ids; last-tool sizing policy
        // lives in the pipe (spec.md §4.4).
        let adapter = AnthropicAdapter;
        let body = json!({
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "a", "name": "t1", "input": {}},
                    {"type": "tool_use", "id": "b", "name": "t2", "input": {}},
                    {"type": "tool_use", "id": "c", "name": "t3", "input": {}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "a", "content": "x".repeat(50)},
                    {"type": "tool_result", "tool_use_id": "b", "content": "x".repeat(2000)},
                    {"type": "tool_result", "tool_use_id": "c", "content": "x".repeat(8000)}
                ]}
            ]
        });
        let out = adapter.extract_tool_output(&body).unwrap();
        assert_eq!(out.len(), 3);
        assert!(!out[0].is_last && !out[1].is_last && out[2].is_last);
    }

    #[test]
    fn apply_tool_output_touches_only_target_block() {
        let adapter = AnthropicAdapter;
        let body = sample_body();
        let rewritten = adapter
            .apply_tool_output(
                &body,
                &[CompressedResult {
                    id: "toolu_1".into(),
                    compressed: "summary".into(),
                }],
            )
            .unwrap();
        assert_eq!(
            rewritten["messages"][2]["content"][0]["content"],
            json!("summary")
        );
        assert_eq!(rewritten["messages"][0], body["messages"][0]);
    }

    #[test]
    fn detects_expand_tool_use() {
        let adapter = AnthropicAdapter;
        let response = json!({
            "content": [
                {"type": "tool_use", "id": "toolu_2", "name": "expand_context", "input": {"shadow_id": "shadow_abc"}}
            ]
        });
        assert_eq!(adapter.detect_expand_call(&response), vec!["shadow_abc"]);
    }
}
