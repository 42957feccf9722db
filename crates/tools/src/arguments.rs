//! Tool Argument Handling
//!
//! Streamed argument text is assembled from fragments and may be truncated or
//! not JSON at all. Parsing never fails: anything that is not a JSON object is
//! kept as a single free-text argument.

use tracing::debug;

use parley_llm::types::{ToolCall, ToolDefinition};

/// Argument key used when a tool has no declared properties
const DEFAULT_ARGUMENT_KEY: &str = "input";

/// Key that wraps a free-text payload for the named tool
pub fn fallback_argument_key(tools: &[ToolDefinition], name: &str) -> String {
    tools
        .iter()
        .find(|t| t.name == name)
        .and_then(|t| t.input_schema.primary_property())
        .unwrap_or(DEFAULT_ARGUMENT_KEY)
        .to_string()
}

/// Build a `ToolCall` from a reassembled stream fragment
pub fn parse_tool_call(
    id: &str,
    name: &str,
    raw_arguments: &str,
    tools: &[ToolDefinition],
) -> ToolCall {
    let key = fallback_argument_key(tools, name);
    let trimmed = raw_arguments.trim();
    let is_object = serde_json::from_str::<serde_json::Value>(trimmed)
        .map(|v| v.is_object())
        .unwrap_or(false);
    if !trimmed.is_empty() && !is_object {
        debug!(tool = name, key = %key, "tool arguments wrapped as free text");
    }
    ToolCall::from_raw_arguments(id, name, trimmed, &key)
}

/// Render a tool call's arguments as the input text for capability dispatch.
///
/// A single string argument is passed through as-is; anything else becomes
/// `key: value` pairs joined by commas, in key order.
pub fn argument_text(call: &ToolCall) -> String {
    if call.arguments.len() == 1 {
        if let Some(serde_json::Value::String(s)) = call.arguments.values().next() {
            return s.clone();
        }
    }

    let mut pairs: Vec<(&String, &serde_json::Value)> = call.arguments.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{}: {}", k, s),
            other => format!("{}: {}", k, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
