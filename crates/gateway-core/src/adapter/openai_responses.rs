//! OpenAI Responses adapter. The body carries a flat `input[]` array of
//! typed items; tool calls are `function_call` items, tool outputs are
//! `function_call_output` items, paired by `call_id`.

use serde_json::{json, Value};

use super::{Adapter, CompressedResult, ExtractedTool, ExtractedToolOutput, ProviderTag, EXPAND_CONTEXT_TOOL_NAME};
use crate::error::GatewayError;

pub struct OpenAiResponsesAdapter;

fn input_items(body: &Value) -> Result<&Vec<Value>, GatewayError> {
    body.get("input")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::AdapterError("missing input array".into()))
}

fn call_name_for_call_id(items: &[Value], call_id: &str) -> String {
    items
        .iter()
        .find(|item| {
            item.get("type").and_then(Value::as_str) == Some("function_call")
                && item.get("call_id").and_then(Value::as_str) == Some(call_id)
        })
        .and_then(|item| item.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn message_text(item: &Value) -> String {
    match item.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

impl Adapter for OpenAiResponsesAdapter {
    fn tag(&self) -> ProviderTag {
        ProviderTag::OpenAiResponses
    }

    fn extract_tool_output(&self, body: &Value) -> Result<Vec<ExtractedToolOutput>, GatewayError> {
        let items = input_items(body)?;
        let output_indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.get("type").and_then(Value::as_str) == Some("function_call_output"))
            .map(|(i, _)| i)
            .collect();

        let mut out = Vec::with_capacity(output_indices.len());
        for (pos, &idx) in output_indices.iter().enumerate() {
            let item = &items[idx];
            let call_id = item
                .get("call_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let content = match item.get("output") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            out.push(ExtractedToolOutput {
                tool_name: call_name_for_call_id(&items[..idx], &call_id),
                content,
                id: call_id,
                message_index: idx,
                block_index: 0,
                is_last: pos + 1 == output_indices.len(),
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
        let items = out
            .get_mut("input")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| GatewayError::AdapterError("missing input array".into()))?;

        for item in items.iter_mut() {
            if item.get("type").and_then(Value::as_str) != Some("function_call_output") {
                continue;
            }
            let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or("");
            if let Some(result) = results.iter().find(|r| r.id == call_id) {
                item["output"] = json!(result.compressed);
            }
        }
        Ok(out)
    }

    fn extract_user_query(&self, body: &Value) -> String {
        let items = match input_items(body) {
            Ok(i) => i.as_slice(),
            Err(_) => return String::new(),
        };
        items
            .iter()
            .rev()
            .find(|item| {
                item.get("type").and_then(Value::as_str).unwrap_or("message") == "message"
                    && item.get("role").and_then(Value::as_str) == Some("user")
            })
            .map(message_text)
            .unwrap_or_default()
    }

    fn detect_expand_call(&self, response: &Value) -> Vec<String> {
        let output = response
            .get("output")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        output
            .iter()
            .filter(|item| {
                item.get("type").and_then(Value::as_str) == Some("function_call")
                    && item.get("name").and_then(Value::as_str) == Some(EXPAND_CONTEXT_TOOL_NAME)
            })
            .filter_map(|item| {
                let args = item.get("arguments")?.as_str()?;
                let parsed: Value = serde_json::from_str(args).ok()?;
                parsed.get("shadow_id")?.as_str().map(String::from)
            })
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
        let items = out
            .get_mut("input")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| GatewayError::AdapterError("missing input array".into()))?;

        let expand_call = response
            .get("output")
            .and_then(Value::as_array)
            .and_then(|output| {
                output.iter().find(|item| {
                    item.get("type").and_then(Value::as_str) == Some("function_call")
                        && item
                            .get("arguments")
                            .and_then(Value::as_str)
                            .map(|a| a.contains(shadow_id))
                            .unwrap_or(false)
                })
            })
            .cloned();

        let call_id = expand_call
            .as_ref()
            .and_then(|c| c.get("call_id"))
            .and_then(Value::as_str)
            .unwrap_or("expand_call")
            .to_string();

        if let Some(call) = expand_call {
            items.push(call);
        }
        items.push(json!({
            "type": "function_call_output",
            "call_id": call_id,
            "output": content,
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
        if let Some(output) = out.get_mut("output").and_then(Value::as_array_mut) {
            output.retain(|item| {
                !(item.get("type").and_then(Value::as_str) == Some("function_call")
                    && item.get("name").and_then(Value::as_str) == Some(EXPAND_CONTEXT_TOOL_NAME))
            });
        }
        Ok(out)
    }
}

fn expand_tool_definition() -> Value {
    json!({
        "type": "function",
        "name": EXPAND_CONTEXT_TOOL_NAME,
        "description": "Fetch the full original content behind a shadow reference emitted in a compressed tool result.",
        "parameters": {
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
            "model": "gpt-4o",
            "input": [
                {"type": "message", "role": "user", "content": "run the tests"},
                {"type": "function_call", "call_id": "call_1", "name": "run_tests", "arguments": "{}"},
                {"type": "function_call_output", "call_id": "call_1", "output": "{\"status\":\"ok\"}"}
            ]
        })
    }

    #[test]
    fn extraction_order_and_is_last() {
        let adapter = OpenAiResponsesAdapter;
        let out = adapter.extract_tool_output(&sample_body()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "call_1");
        assert_eq!(out[0].tool_name, "run_tests");
        assert!(out[0].is_last);
    }

    #[test]
    fn apply_tool_output_round_trips_on_empty_results() {
        let adapter = OpenAiResponsesAdapter;
        let body = sample_body();
        assert_eq!(adapter.apply_tool_output(&body, &[]).unwrap(), body);
    }

    #[test]
    fn apply_tool_output_rewrites_only_target() {
        let adapter = OpenAiResponsesAdapter;
        let body = sample_body();
        let rewritten = adapter
            .apply_tool_output(
                &body,
                &[CompressedResult {
                    id: "call_1".into(),
                    compressed: "summary".into(),
                }],
            )
            .unwrap();
        assert_eq!(rewritten["input"][2]["output"], json!("summary"));
        assert_eq!(rewritten["input"][0], body["input"][0]);
    }

    #[test]
    fn detects_expand_call() {
        let adapter = OpenAiResponsesAdapter;
        let response = json!({
            "output": [
                {"type": "function_call", "call_id": "c2", "name": "expand_context", "arguments": "{\"shadow_id\":\"shadow_xyz\"}"}
            ]
        });
        assert_eq!(adapter.detect_expand_call(&response), vec!["shadow_xyz"]);
    }
}
