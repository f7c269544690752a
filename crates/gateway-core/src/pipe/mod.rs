//! Pipes: per-category body transformers dispatched to by the router
//! (spec.md §4.3/§4.4). Only `ToolOutputPipe` has a real implementation;
//! tool discovery extraction is a stub per spec.md §4.2, so there is no
//! `ToolDiscoveryPipe` to pool.

pub mod tool_output;

pub use tool_output::ToolOutputPipe;

use serde_json::Value;

/// One row of the per-item decision table (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStatus {
    PassthroughSmall,
    PassthroughLarge,
    PassthroughLast,
    CacheHit,
    Compressed,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::PassthroughSmall => "passthrough_small",
            MappingStatus::PassthroughLarge => "passthrough_large",
            MappingStatus::PassthroughLast => "passthrough_last",
            MappingStatus::CacheHit => "cache_hit",
            MappingStatus::Compressed => "compressed",
        }
    }
}

/// Telemetry record for one processed tool output, fed into
/// `PipelineContext.tool_output_compressions` (SPEC_FULL.md §4.7).
#[derive(Debug, Clone)]
pub struct CompressionRecord {
    pub id: String,
    pub tool_name: String,
    pub status: MappingStatus,
    pub shadow_id: Option<String>,
    pub original_bytes: usize,
}

/// Per-request input to a pipe: the body, the resolved adapter, and the
/// per-request compression threshold override (`X-Compression-Threshold`).
pub struct PipeContext<'a> {
    pub body: &'a Value,
    pub adapter: &'a dyn crate::adapter::Adapter,
    pub user_query: String,
    pub min_bytes_override: Option<usize>,
}

/// Result of running a pipe over one request: the rewritten body plus the
/// per-item decisions for telemetry.
pub struct PipeOutcome {
    pub body: Value,
    pub compressions: Vec<CompressionRecord>,
}
