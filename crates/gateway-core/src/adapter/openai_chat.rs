//! OpenAI Chat Completions adapter. Tool outputs are messages with
//! `role: "tool"` and a `tool_call_id`; the tool's name lives on the prior
//! assistant message's `tool_calls[*].function.name`.

use serde_json::{json, Value};

use super::{
    latest_role_text, Adapter, CompressedResult, ExtractedTool, ExtractedToolOutput,
    ProviderTag, EXPAND_CONTEXT_TOOL_NAME,
};
use crate::error::GatewayError;

pub struct OpenAiChatAdapter;

fn messages(body: &Value) -> Result<&Vec<Value>, GatewayError> {
    body.get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::AdapterError("missing messages array".into()))
}

fn tool_name_for_call_id(messages: &[Value], call_id: &str) -> String {
    for msg in messages.iter().rev() {
        if let Some(calls) = msg.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                if call.get("id").and_then(Value::as_str) == Some(call_id) {
                    return call
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                }
            }
        }
    }
    String::new()
}

fn content_text(msg: &Value) -> String {
    match msg.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

impl Adapter for OpenAiChatAdapter {
    fn tag(&self) -> ProviderTag {
        ProviderTag::OpenAiChat
    }

    fn extract_tool_output(&self, body: &Value) -> Result<Vec<ExtractedToolOutput>, GatewayError> {
        let msgs = messages(body)?;
        let tool_indices: Vec<usize> = msgs
            .iter()
            .enumerate()
            .filter(|(_, m)| m.get("role").and_then(Value::as_str) == Some("tool"))
            .map(|(i, _)| i)
            .collect();

        let mut out = Vec::with_capacity(tool_indices.len());
        for (pos, &idx) in tool_indices.iter().enumerate() {
            let msg = &msgs[idx];
            let id = msg
                .get("tool_call_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            out.push(ExtractedToolOutput {
                content: content_text(msg),
                tool_name: tool_name_for_call_id(&msgs[..idx], &id),
                id,
                message_index: idx,
                block_index: 0,
                is_last: pos + 1 == tool_indices.len(),
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
            .filter_map(|t| t.get("function")?.get("name")?.as_str())
            .map(|name| ExtractedTool {
                name: name.to_string(),
            })
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
            if msg.get("role").and_then(Value::as_str) != Some("tool") {
                continue;
            }
            let call_id = msg.get("tool_call_id").and_then(Value::as_str).unwrap_or("");
            if let Some(result) = results.iter().find(|r| r.id == call_id) {
                msg["content"] = json!(result.compressed);
            }
        }
        Ok(out)
    }

    fn extract_user_query(&self, body: &Value) -> String {
        let msgs = match messages(body) {
            Ok(m) => m.as_slice(),
            Err(_) => return String::new(),
        };
        latest_role_text(
            msgs,
            |m| m.get("role").and_then(Value::as_str) == Some("user"),
            content_text,
        )
    }

    fn detect_expand_call(&self, response: &Value) -> Vec<String> {
        let calls = response
            .pointer("/choices/0/message/tool_calls")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        calls
            .iter()
            .filter(|c| {
                c.get("function").and_then(|f| f.get("name")).and_then(Value::as_str)
                    == Some(EXPAND_CONTEXT_TOOL_NAME)
            })
            .filter_map(|c| {
                let args = c.get("function")?.get("arguments")?.as_str()?;
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
        let msgs = out
            .get_mut("messages")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| GatewayError::AdapterError("missing messages array".into()))?;

        let assistant_message = response
            .pointer("/choices/0/message")
            .cloned()
            .unwrap_or(json!({"role": "assistant", "content": null}));

        let call_id = response
            .pointer("/choices/0/message/tool_calls")
            .and_then(Value::as_array)
            .and_then(|calls| {
                calls.iter().find(|c| {
                    c.get("function")
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                        .map(|a| a.contains(shadow_id))
                        .unwrap_or(false)
                })
            })
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .unwrap_or("expand_call")
            .to_string();

        msgs.push(assistant_message);
        msgs.push(json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": content,
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

        let already_declared = tools_arr.iter().any(|t| {
            t.get("function").and_then(|f| f.get("name")).and_then(Value::as_str)
                == Some(EXPAND_CONTEXT_TOOL_NAME)
        });
        if !already_declared {
            tools_arr.push(expand_tool_definition());
        }
        Ok(out)
    }

    fn strip_expand_from_response(&self, response: &Value) -> Result<Value, GatewayError> {
        let mut out = response.clone();
        if let Some(message) = out.pointer_mut("/choices/0/message") {
            if let Some(calls) = message.get_mut("tool_calls").and_then(Value::as_array_mut) {
                calls.retain(|c| {
                    c.get("function").and_then(|f| f.get("name")).and_then(Value::as_str)
                        != Some(EXPAND_CONTEXT_TOOL_NAME)
                });
                let empty = calls.is_empty();
                if empty {
                    if let Some(obj) = message.as_object_mut() {
                        obj.remove("tool_calls");
                    }
                }
            }
        }
        Ok(out)
    }
}

fn expand_tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": EXPAND_CONTEXT_TOOL_NAME,
            "description": "Fetch the full original content behind a shadow reference emitted in a compressed tool result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "shadow_id": { "type": "string" }
                },
                "required": ["shadow_id"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> Value {
        json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "run the tests"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "run_tests", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "{\"status\":\"ok\"}"}
            ]
        })
    }

    #[test]
    fn extracts_single_tool_output_marked_last() {
        let adapter = OpenAiChatAdapter;
        let out = adapter.extract_tool_output(&sample_body()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "call_1");
        assert_eq!(out[0].tool_name, "run_tests");
        assert!(out[0].is_last);
    }

    #[test]
    fn apply_tool_output_is_byte_faithful_on_empty_results() {
        let adapter = OpenAiChatAdapter;
        let body = sample_body();
        let rewritten = adapter.apply_tool_output(&body, &[]).unwrap();
        assert_eq!(body, rewritten);
    }

    #[test]
    fn apply_tool_output_touches_only_matching_id() {
        let adapter = OpenAiChatAdapter;
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
        assert_eq!(rewritten["messages"][2]["content"], json!("summary"));
        assert_eq!(rewritten["messages"][0], body["messages"][0]);
        assert_eq!(rewritten["messages"][1], body["messages"][1]);
    }

    #[test]
    fn detects_expand_call_arguments() {
        let adapter = OpenAiChatAdapter;
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_2",
                        "function": {"name": "expand_context", "arguments": "{\"shadow_id\":\"shadow_abc\"}"}
                    }]
                }
            }]
        });
        assert_eq!(adapter.detect_expand_call(&response), vec!["shadow_abc"]);
    }

    #[test]
    fn strip_expand_removes_only_expand_calls() {
        let adapter = OpenAiChatAdapter;
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [
                        {"id": "call_2", "function": {"name": "expand_context", "arguments": "{}"}},
                        {"id": "call_3", "function": {"name": "other_tool", "arguments": "{}"}}
                    ]
                }
            }]
        });
        let stripped = adapter.strip_expand_from_response(&response).unwrap();
        let calls = stripped.pointer("/choices/0/message/tool_calls").unwrap();
        assert_eq!(calls.as_array().unwrap().len(), 1);
        assert_eq!(calls[0]["id"], "call_3");
    }

    #[test]
    fn ensure_expand_tool_declared_is_idempotent() {
        let adapter = OpenAiChatAdapter;
        let body = sample_body();
        let once = adapter.ensure_expand_tool_declared(&body).unwrap();
        let twice = adapter.ensure_expand_tool_declared(&once).unwrap();
        assert_eq!(once["tools"].as_array().unwrap().len(), 1);
        assert_eq!(twice["tools"].as_array().unwrap().len(), 1);
    }
}
