//! Provider-agnostic request/response adapter layer (spec.md §4.2).
//!
//! Each adapter owns all wire-format knowledge for one provider and works
//! directly on the `serde_json::Value` DOM (SPEC_FULL.md design note:
//! "Dynamic JSON shapes" — converting the whole request to a typed schema
//! would break on the next provider field addition, so only the narrow
//! `ExtractedToolOutput`/`CompressedResult` values are strongly typed).

mod anthropic;
mod openai_chat;
mod openai_responses;

pub use anthropic::AnthropicAdapter;
pub use openai_chat::OpenAiChatAdapter;
pub use openai_responses::OpenAiResponsesAdapter;

use serde_json::Value;

use crate::error::GatewayError;

pub const EXPAND_CONTEXT_TOOL_NAME: &str = "expand_context";

/// A tool-call result pulled out of a request body, positioned so the
/// adapter can later mutate exactly the right slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedToolOutput {
    pub id: String,
    pub content: String,
    pub tool_name: String,
    pub message_index: usize,
    pub block_index: usize,
    pub is_last: bool,
}

/// A tool definition present in the request (discovery pipe input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTool {
    pub name: String,
}

/// The replacement the pipe wants written back into the body for a given
/// tool-output id.
#[derive(Debug, Clone)]
pub struct CompressedResult {
    pub id: String,
    pub compressed: String,
}

/// Stable tag identifying which wire format a body uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderTag {
    OpenAiChat,
    OpenAiResponses,
    Anthropic,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::OpenAiChat => "openai-chat",
            ProviderTag::OpenAiResponses => "openai-responses",
            ProviderTag::Anthropic => "anthropic",
        }
    }

    pub fn from_header(value: &str) -> Option<ProviderTag> {
        match value {
            "openai-chat" | "openai" => Some(ProviderTag::OpenAiChat),
            "openai-responses" => Some(ProviderTag::OpenAiResponses),
            "anthropic" => Some(ProviderTag::Anthropic),
            _ => None,
        }
    }

    /// Provider inferred from the inbound request path, per spec.md §6.
    pub fn from_path(path: &str) -> Option<ProviderTag> {
        match path {
            "/v1/messages" => Some(ProviderTag::Anthropic),
            "/v1/chat/completions" => Some(ProviderTag::OpenAiChat),
            "/v1/responses" => Some(ProviderTag::OpenAiResponses),
            _ => None,
        }
    }
}

/// Capabilities every provider adapter implements (spec.md §4.2 table).
pub trait Adapter: Send + Sync {
    fn tag(&self) -> ProviderTag;

    /// Tool results in conversation order. `is_last` is true only for the
    /// final one.
    fn extract_tool_output(&self, body: &Value) -> Result<Vec<ExtractedToolOutput>, GatewayError>;

    /// Tool definitions declared in the request (discovery pipe input).
    fn extract_tool_discovery(&self, body: &Value) -> Result<Vec<ExtractedTool>, GatewayError>;

    /// Returns a new body where every tool output whose id matches one of
    /// `results` has been replaced by the corresponding string, and no
    /// other bytes are touched.
    fn apply_tool_output(
        &self,
        body: &Value,
        results: &[CompressedResult],
    ) -> Result<Value, GatewayError>;

    /// The latest user-role message's text, or empty if there is none.
    fn extract_user_query(&self, body: &Value) -> String;

    /// Tool calls in the given response whose function is `expand_context`;
    /// returns the `shadow_id` argument of each.
    fn detect_expand_call(&self, response: &Value) -> Vec<String>;

    /// Builds a follow-up request body answering the expand call for
    /// `shadow_id` with `content`, appended to the original conversation.
    fn inject_expand_result(
        &self,
        body: &Value,
        response: &Value,
        shadow_id: &str,
        content: &str,
    ) -> Result<Value, GatewayError>;

    /// Adds the `expand_context(shadow_id: string)` tool definition to the
    /// outgoing request's tool list, idempotently.
    fn ensure_expand_tool_declared(&self, body: &Value) -> Result<Value, GatewayError>;

    /// Strips any expand-context tool calls/declarations from a
    /// user-visible response body.
    fn strip_expand_from_response(&self, response: &Value) -> Result<Value, GatewayError>;
}

/// Registry keyed by `ProviderTag`, resolving the right adapter for a
/// request (spec.md §9 "Polymorphism over providers").
pub struct AdapterRegistry {
    openai_chat: OpenAiChatAdapter,
    openai_responses: OpenAiResponsesAdapter,
    anthropic: AnthropicAdapter,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self {
            openai_chat: OpenAiChatAdapter,
            openai_responses: OpenAiResponsesAdapter,
            anthropic: AnthropicAdapter,
        }
    }
}

impl AdapterRegistry {
    pub fn get(&self, tag: ProviderTag) -> &dyn Adapter {
        match tag {
            ProviderTag::OpenAiChat => &self.openai_chat,
            ProviderTag::OpenAiResponses => &self.openai_responses,
            ProviderTag::Anthropic => &self.anthropic,
        }
    }
}

/// Helper shared by all three adapters: finds the latest message whose
/// role equals `role_match` and returns its textual content, extracted via
/// `text_of`. Kept generic over the per-provider "what is text" rule since
/// Anthropic content can be a string or an array of blocks.
pub(crate) fn latest_role_text<'a>(
    messages: &'a [Value],
    is_role: impl Fn(&Value) -> bool,
    text_of: impl Fn(&Value) -> String,
) -> String {
    messages
        .iter()
        .rev()
        .find(|m| is_role(m))
        .map(text_of)
        .unwrap_or_default()
}
