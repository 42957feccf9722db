//! Plan Decomposition
//!
//! A lexical gate screens commands for conjunctive phrasing before any model
//! call. Commands that pass get one model round trip that returns either the
//! single-step token or a JSON array of steps.

use parley_core::CapabilityManifest;
use parley_llm::provider::LlmProvider;
use parley_llm::types::{LlmRequestOptions, Message, ToolCallMode};
use tracing::{debug, warn};

use crate::services::prompts::{decomposition_prompt, SINGLE_STEP_TOKEN};
use crate::utils::text::contains_phrase;

/// Phrases that suggest a command chains more than one action
pub const CONJUNCTION_SIGNALS: &[&str] = &[
    "and then",
    "then",
    "after that",
    "afterwards",
    "after which",
    "followed by",
    "and also",
    "as well as",
    "once that's done",
    "when you're done",
];

/// Outcome of asking the model to decompose a command
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    /// Handle as one action; the router continues
    Single,
    /// Two or more `(capability, input)` steps in execution order
    Steps(Vec<(String, String)>),
}

/// Cheap check run before any model call.
pub fn is_compound_candidate(text: &str) -> bool {
    CONJUNCTION_SIGNALS
        .iter()
        .any(|signal| contains_phrase(text, signal))
}

/// Ask the model to split `command` into steps.
///
/// Model faults and malformed output both mean "single step".
pub async fn decompose(
    provider: &dyn LlmProvider,
    command: &str,
    manifest: &CapabilityManifest,
    max_steps: usize,
) -> Decomposition {
    let prompt = decomposition_prompt(command, &manifest.manifest_text(), max_steps);
    let options = LlmRequestOptions {
        tool_call_mode: ToolCallMode::None,
        temperature_override: Some(0.1),
        max_tokens_override: Some(400),
    };

    let response = match provider
        .send_message(vec![Message::user(prompt)], None, vec![], options)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "decomposition call failed; treating as single step");
            return Decomposition::Single;
        }
    };

    match parse_steps(response.text_or_empty(), manifest, max_steps) {
        Some(steps) => {
            debug!(steps = steps.len(), "command decomposed");
            Decomposition::Steps(steps)
        }
        None => Decomposition::Single,
    }
}

/// Parse the model's reply into valid steps, or `None` for single step.
pub fn parse_steps(
    text: &str,
    manifest: &CapabilityManifest,
    max_steps: usize,
) -> Option<Vec<(String, String)>> {
    let trimmed = text.trim();
    if trimmed
        .trim_matches(|c: char| !c.is_alphanumeric())
        .eq_ignore_ascii_case(SINGLE_STEP_TOKEN)
    {
        return None;
    }

    let json = extract_json_array(trimmed)?;
    let values: Vec<serde_json::Value> = match serde_json::from_str(&json) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "decomposition reply is not a JSON array");
            return None;
        }
    };

    let steps: Vec<(String, String)> = values
        .iter()
        .filter_map(|value| {
            let capability = value.get("capability").and_then(|v| v.as_str())?.trim();
            let input = value
                .get("input")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim();
            if !manifest.is_valid_target(capability) {
                warn!(capability, "dropping step for unknown capability");
                return None;
            }
            Some((capability.to_string(), input.to_string()))
        })
        .take(max_steps)
        .collect();

    (steps.len() >= 2).then_some(steps)
}

/// Extract the first JSON array from text that may contain markdown fences.
fn extract_json_array(text: &str) -> Option<String> {
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let body = match after_fence.find('\n') {
            Some(nl) => &after_fence[nl + 1..],
            None => after_fence,
        };
        if let Some(end) = body.find("```") {
            let content = body[..end].trim();
            if content.starts_with('[') {
                return Some(content.to_string());
            }
        }
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| text[start..=end].to_string())
}
