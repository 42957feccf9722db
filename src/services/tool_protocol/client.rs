//! Tool protocol client
//!
//! Owns the local provider, the optional remote provider and the quality
//! gate. Streaming requests recover from a context overflow by trimming the
//! history once. Plain chat never fails; it degrades to the best text it has.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use parley_llm::provider::LlmProvider;
use parley_llm::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageContent, MessageRole,
    ToolCall, ToolDefinition,
};
use parley_quality_gates::{QualityFailure, QualityGatePipeline};

use super::stream::{tool_stream, ToolStream};
use crate::services::prompts::{DIRECT_NUDGE, TOOL_SYNTHESIS_INSTRUCTION};

/// Non-system messages kept when trimming after a context overflow
pub const TRIM_KEEP_RECENT: usize = 6;

/// Spoken when no provider produced usable text
pub const GENERIC_FALLBACK_REPLY: &str =
    "Sorry, I couldn't come up with a good answer to that. Could you try asking another way?";

/// Where a chat attempt was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptSource {
    Local,
    LocalNudged,
    Remote,
}

impl AttemptSource {
    pub fn is_local(&self) -> bool {
        matches!(self, AttemptSource::Local | AttemptSource::LocalNudged)
    }
}

impl std::fmt::Display for AttemptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptSource::Local => write!(f, "local"),
            AttemptSource::LocalNudged => write!(f, "local_nudged"),
            AttemptSource::Remote => write!(f, "remote"),
        }
    }
}

/// Why an attempt was not accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The provider call itself failed
    Provider { message: String },
    /// The text was rejected by the quality gate
    Quality { failure: QualityFailure },
}

/// Record of a single attempt on the fallback ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAttempt {
    pub source: AttemptSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AttemptFailure>,
}

impl ChatAttempt {
    fn accepted(&self) -> bool {
        self.failure.is_none() && self.text.is_some()
    }
}

/// Result of the plain chat fallback ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Text to speak; never empty
    pub text: String,
    /// The attempt whose text was accepted, `None` when degraded
    pub accepted_from: Option<AttemptSource>,
    /// Every attempt in ladder order
    pub attempts: Vec<ChatAttempt>,
}

impl ChatOutcome {
    /// Whether the text is a fallback rather than an accepted reply
    pub fn is_degraded(&self) -> bool {
        self.accepted_from.is_none()
    }
}

/// Keep the leading system message and the most recent non-system messages.
pub fn trim_history(messages: &[Message]) -> Vec<Message> {
    let system = messages
        .iter()
        .find(|m| m.role == MessageRole::System)
        .cloned();
    let rest: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .collect();
    let start = rest.len().saturating_sub(TRIM_KEEP_RECENT);

    system
        .into_iter()
        .chain(rest[start..].iter().map(|m| (*m).clone()))
        .collect()
}

/// Add the "be direct" nudge to the system message, inserting one if absent
fn nudged(messages: &[Message]) -> Vec<Message> {
    let mut out = messages.to_vec();
    match out.iter_mut().find(|m| m.role == MessageRole::System) {
        Some(system) => {
            let text = format!("{}\n\n{}", system.text_content(), DIRECT_NUDGE);
            *system = Message::system(text);
        }
        None => out.insert(0, Message::system(DIRECT_NUDGE)),
    }
    out
}

/// Remove leaked template markers from otherwise usable text
fn strip_markers(text: &str, markers: &[String]) -> String {
    let mut cleaned = text.to_string();
    // special tokens such as <|im_end|> go as a whole
    while let Some(start) = cleaned.find("<|") {
        match cleaned[start..].find("|>") {
            Some(len) => cleaned.replace_range(start..start + len + 2, " "),
            None => break,
        }
    }
    for marker in markers {
        cleaned = cleaned.replace(marker.as_str(), " ");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Client for OpenAI-compatible streaming chat with tool calls
pub struct ToolProtocolClient {
    local: Arc<dyn LlmProvider>,
    remote: Option<Arc<dyn LlmProvider>>,
    gates: QualityGatePipeline,
}

impl ToolProtocolClient {
    pub fn new(
        local: Arc<dyn LlmProvider>,
        remote: Option<Arc<dyn LlmProvider>>,
        gates: QualityGatePipeline,
    ) -> Self {
        Self {
            local,
            remote,
            gates,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn local(&self) -> &Arc<dyn LlmProvider> {
        &self.local
    }

    /// Messages for a tool-enabled request: exactly one system and one user turn.
    pub fn tool_request(system: &str, user: &str) -> Vec<Message> {
        vec![Message::system(system), Message::user(user)]
    }

    /// Start a tool-enabled stream.
    ///
    /// Requests with tools must carry exactly [system, user]; anything else
    /// is rejected before a network call is made.
    pub async fn stream_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
    ) -> LlmResult<ToolStream> {
        let shape_ok = messages.len() == 2
            && messages[0].role == MessageRole::System
            && messages[1].role == MessageRole::User;
        if !tools.is_empty() && !shape_ok {
            return Err(LlmError::InvalidRequest {
                message: "tool-enabled requests must contain exactly a system and a user message"
                    .to_string(),
            });
        }
        self.open_stream(messages, tools, options).await
    }

    /// Resume after a tool ran.
    ///
    /// Appends the assistant tool-call message, the tool result and a
    /// synthesis instruction to `history`, then streams again. Passing
    /// `tools` lets the model chain into another call.
    pub async fn continue_after_tool(
        &self,
        history: &mut Vec<Message>,
        call: &ToolCall,
        result: &str,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
    ) -> LlmResult<ToolStream> {
        history.push(Message::assistant_tool_call(call));
        history.push(Message::tool_result(call.id.clone(), result));
        history.push(Message::user(TOOL_SYNTHESIS_INSTRUCTION));
        debug!(tool = %call.name, history_len = history.len(), "continuing after tool result");
        self.open_stream(history.clone(), tools, options).await
    }

    /// Open a stream on the local provider, trimming and retrying once on
    /// context overflow.
    async fn open_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
    ) -> LlmResult<ToolStream> {
        let model = self.local.model().to_string();
        let first = self
            .local
            .stream_lines(messages.clone(), None, tools.clone(), options.clone())
            .await;

        let lines = match first {
            Err(e) if e.is_context_overflow() => {
                let trimmed = trim_history(&messages);
                warn!(
                    before = messages.len(),
                    after = trimmed.len(),
                    "context overflow; retrying once with trimmed history"
                );
                self.local
                    .stream_lines(trimmed, None, tools.clone(), options)
                    .await?
            }
            other => other?,
        };

        Ok(tool_stream(lines, &model, tools))
    }

    /// Non-streaming call with the same one-shot overflow recovery
    async fn send_with_recovery(
        provider: &dyn LlmProvider,
        messages: Vec<Message>,
        options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        match provider
            .send_message(messages.clone(), None, vec![], options.clone())
            .await
        {
            Err(e) if e.is_context_overflow() => {
                let trimmed = trim_history(&messages);
                warn!(
                    provider = provider.name(),
                    before = messages.len(),
                    after = trimmed.len(),
                    "context overflow; retrying once with trimmed history"
                );
                provider.send_message(trimmed, None, vec![], options).await
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        source: AttemptSource,
        messages: Vec<Message>,
        command: &str,
        options: LlmRequestOptions,
    ) -> ChatAttempt {
        match Self::send_with_recovery(provider, messages, options).await {
            Ok(response) => {
                let text = response.text_or_empty().trim().to_string();
                let verdict = self.gates.evaluate(command, &text);
                let failure = verdict
                    .failure()
                    .cloned()
                    .map(|failure| AttemptFailure::Quality { failure });
                ChatAttempt {
                    source,
                    text: Some(text),
                    failure,
                }
            }
            Err(e) => ChatAttempt {
                source,
                text: None,
                failure: Some(AttemptFailure::Provider {
                    message: e.to_string(),
                }),
            },
        }
    }

    /// Plain chat with the quality-gated fallback ladder.
    ///
    /// local → local with a "be direct" nudge → remote → best local attempt
    /// → generic text. Never returns an error.
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        command: &str,
        options: LlmRequestOptions,
    ) -> ChatOutcome {
        let mut attempts = Vec::new();

        let plan: Vec<(AttemptSource, Vec<Message>)> = vec![
            (AttemptSource::Local, messages.clone()),
            (AttemptSource::LocalNudged, nudged(&messages)),
        ];
        for (source, msgs) in plan {
            let attempt = self
                .attempt(self.local.as_ref(), source, msgs, command, options.clone())
                .await;
            log_attempt(&attempt);
            let accepted = attempt.accepted();
            let text = attempt.text.clone();
            attempts.push(attempt);
            if accepted {
                return ChatOutcome {
                    text: text.unwrap_or_default(),
                    accepted_from: Some(source),
                    attempts,
                };
            }
        }

        if let Some(remote) = &self.remote {
            let attempt = self
                .attempt(
                    remote.as_ref(),
                    AttemptSource::Remote,
                    messages.clone(),
                    command,
                    options.clone(),
                )
                .await;
            log_attempt(&attempt);
            let accepted = attempt.accepted();
            let text = attempt.text.clone();
            attempts.push(attempt);
            if accepted {
                return ChatOutcome {
                    text: text.unwrap_or_default(),
                    accepted_from: Some(AttemptSource::Remote),
                    attempts,
                };
            }
        }

        let text = self
            .best_local_text(&attempts)
            .unwrap_or_else(|| GENERIC_FALLBACK_REPLY.to_string());
        info!(attempts = attempts.len(), "all chat attempts rejected; degrading");
        ChatOutcome {
            text,
            accepted_from: None,
            attempts,
        }
    }

    /// The least bad local text. Echoes and empty replies are never used.
    fn best_local_text(&self, attempts: &[ChatAttempt]) -> Option<String> {
        let rank = |failure: &Option<AttemptFailure>| -> Option<u8> {
            match failure {
                None => Some(0),
                Some(AttemptFailure::Quality { failure }) => match failure {
                    QualityFailure::TooShort { .. } => Some(1),
                    QualityFailure::Repetitive { .. } => Some(2),
                    QualityFailure::TemplateArtifact { .. } => Some(3),
                    QualityFailure::Echo | QualityFailure::Empty => None,
                },
                Some(AttemptFailure::Provider { .. }) => None,
            }
        };

        attempts
            .iter()
            .filter(|a| a.source.is_local())
            .filter_map(|a| Some((rank(&a.failure)?, a.text.as_deref()?)))
            .min_by_key(|(r, _)| *r)
            .map(|(_, text)| strip_markers(text, &self.gates.config().artifact_markers))
            .filter(|text| !text.is_empty())
    }
}

fn log_attempt(attempt: &ChatAttempt) {
    match &attempt.failure {
        None => debug!(source = %attempt.source, "chat attempt accepted"),
        Some(AttemptFailure::Quality { failure }) => {
            info!(source = %attempt.source, %failure, "chat attempt rejected by quality gate")
        }
        Some(AttemptFailure::Provider { message }) => {
            warn!(source = %attempt.source, "chat attempt failed: {}", message)
        }
    }
}

/// Text content of a message list, for logging and tests
pub fn transcript(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| {
            m.content
                .iter()
                .map(|c| match c {
                    MessageContent::Text { text } => text.clone(),
                    MessageContent::ToolUse { name, .. } => format!("<call {}>", name),
                    MessageContent::ToolResult { content, .. } => format!("<result {}>", content),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
