//! OpenAI-Compatible SSE Adapter
//!
//! Handles the OpenAI chat-completions SSE format as spoken by OpenAI,
//! llama.cpp and Ollama. Tool calls arrive as fragments (name first, then
//! argument pieces) and are accumulated until a finish signal.

use serde::Deserialize;
use tracing::debug;

use parley_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};

/// Internal event types from the SSE format
#[derive(Debug, Deserialize)]
struct OpenAIEvent {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// A tool call being assembled from fragments
#[derive(Debug, Default)]
struct PendingTool {
    index: usize,
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    announced: bool,
}

/// Adapter for the OpenAI-compatible SSE format
pub struct OpenAIAdapter {
    model: String,
    pending_tool: Option<PendingTool>,
    completed: bool,
}

impl OpenAIAdapter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            pending_tool: None,
            completed: false,
        }
    }

    /// Model this adapter was created for
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Flush any pending tool call, emitting a ToolComplete event
    fn flush_pending_tool(&mut self) -> Option<UnifiedStreamEvent> {
        let tool = self.pending_tool.take()?;
        let Some(name) = tool.name else {
            debug!(index = tool.index, "dropping tool call fragment without a name");
            return None;
        };
        let id = tool
            .id
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        Some(UnifiedStreamEvent::ToolComplete {
            tool_id: id,
            tool_name: name,
            arguments: tool.arguments,
        })
    }

    fn absorb_tool_delta(&mut self, tc: ToolCallDelta, events: &mut Vec<UnifiedStreamEvent>) {
        let index = tc.index.unwrap_or(0);

        let starts_new = match &self.pending_tool {
            None => true,
            Some(p) => p.index != index || (tc.id.is_some() && p.id.is_some() && p.id != tc.id),
        };
        if starts_new {
            if let Some(done) = self.flush_pending_tool() {
                events.push(done);
            }
            self.pending_tool = Some(PendingTool {
                index,
                ..PendingTool::default()
            });
        }

        let Some(pending) = self.pending_tool.as_mut() else {
            return;
        };
        if let Some(id) = tc.id {
            if !id.is_empty() {
                pending.id = Some(id);
            }
        }
        if let Some(func) = tc.function {
            if let Some(name) = func.name {
                if !name.is_empty() {
                    pending.name = Some(name);
                }
            }
            if let Some(args) = func.arguments {
                pending.arguments.push_str(&args);
            }
        }

        if !pending.announced {
            if let Some(name) = &pending.name {
                pending.announced = true;
                events.push(UnifiedStreamEvent::ToolStart {
                    tool_id: pending.id.clone().unwrap_or_default(),
                    tool_name: name.clone(),
                });
            }
        }
    }
}

impl StreamAdapter for OpenAIAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();

        // SSE comments and non-data fields carry nothing for us
        if trimmed.is_empty() || trimmed.starts_with(':') || trimmed.starts_with("event:") {
            return Ok(vec![]);
        }

        let json_str = match trimmed.strip_prefix("data:") {
            Some(rest) => rest.trim_start(),
            None => trimmed,
        };

        if json_str.is_empty() || json_str == "[DONE]" {
            return Ok(self.finish());
        }

        let event: OpenAIEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];

        if let Some(err) = event.error {
            events.push(UnifiedStreamEvent::Error {
                message: err.message,
                code: err.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            });
        }

        if let Some(usage) = event.usage {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        for choice in event.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        events.push(UnifiedStreamEvent::TextDelta { content });
                    }
                }

                if let Some(tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        self.absorb_tool_delta(tc, &mut events);
                    }
                }
            }

            // Some servers put the final fragment and finish_reason in one chunk
            if let Some(finish_reason) = choice.finish_reason {
                if let Some(tool_event) = self.flush_pending_tool() {
                    events.push(tool_event);
                }
                self.completed = true;
                events.push(UnifiedStreamEvent::Complete {
                    stop_reason: Some(finish_reason),
                });
            }
        }

        Ok(events)
    }

    fn finish(&mut self) -> Vec<UnifiedStreamEvent> {
        let mut events = vec![];
        if let Some(tool_event) = self.flush_pending_tool() {
            events.push(tool_event);
        }
        if !self.completed {
            self.completed = true;
            events.push(UnifiedStreamEvent::Complete { stop_reason: None });
        }
        events
    }

    fn reset(&mut self) {
        self.pending_tool = None;
        self.completed = false;
    }
}
