//! Shared test doubles: a scripted model provider and in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use tokio::sync::Notify;

use parley::models::ResearchResult;
use parley::services::{MemoryStore, SimilarityScorer, SkillDispatcher, WebResearcher};
use parley::{AppError, AppResult};
use parley_core::Capability;
use parley_llm::provider::{LineStream, LlmProvider};
use parley_llm::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageContent, ProviderConfig,
    StopReason, ToolDefinition, UsageStats,
};

// ============================================================================
// Model provider
// ============================================================================

/// Replays scripted responses and streams in order, recording every request
pub struct MockLlmProvider {
    config: ProviderConfig,
    responses: Mutex<Vec<LlmResult<LlmResponse>>>,
    streams: Mutex<Vec<LlmResult<Vec<String>>>>,
    pub requests: Mutex<Vec<Vec<Message>>>,
    pub tool_requests: Mutex<Vec<Vec<String>>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig::default(),
            responses: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            tool_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses(self, responses: Vec<LlmResult<LlmResponse>>) -> Self {
        *self.responses.lock().unwrap() = responses;
        self
    }

    pub fn with_streams(self, streams: Vec<LlmResult<Vec<String>>>) -> Self {
        *self.streams.lock().unwrap() = streams;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        tools: Vec<ToolDefinition>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        self.requests.lock().unwrap().push(messages);
        self.tool_requests
            .lock()
            .unwrap()
            .push(tools.into_iter().map(|t| t.name).collect());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(LlmError::Other {
                message: "No more mock responses available".to_string(),
            })
        } else {
            responses.remove(0)
        }
    }

    async fn stream_lines(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        tools: Vec<ToolDefinition>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LineStream> {
        self.requests.lock().unwrap().push(messages);
        self.tool_requests
            .lock()
            .unwrap()
            .push(tools.into_iter().map(|t| t.name).collect());
        let mut streams = self.streams.lock().unwrap();
        if streams.is_empty() {
            return Err(LlmError::Other {
                message: "No more mock streams available".to_string(),
            });
        }
        let lines = streams.remove(0)?;
        Ok(stream::iter(lines.into_iter().map(Ok)).boxed())
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }
}

pub fn text(content: &str) -> LlmResult<LlmResponse> {
    Ok(LlmResponse {
        content: Some(content.to_string()),
        tool_calls: vec![],
        stop_reason: StopReason::EndTurn,
        usage: UsageStats::default(),
        model: "mock-model".to_string(),
    })
}

pub fn overflow() -> LlmError {
    LlmError::ContextLengthExceeded {
        message: "the request exceeds the available context size".to_string(),
    }
}

/// SSE lines streaming `parts` as text deltas
pub fn sse_text(parts: &[&str]) -> Vec<String> {
    let mut lines: Vec<String> = parts
        .iter()
        .map(|p| {
            format!(
                "data: {}",
                serde_json::json!({"choices": [{"delta": {"content": p}}]})
            )
        })
        .collect();
    lines.push(r#"data: {"choices":[{"finish_reason":"stop"}]}"#.to_string());
    lines.push("data: [DONE]".to_string());
    lines
}

/// SSE lines for one tool call: the name first, then argument fragments
pub fn sse_tool_call(id: &str, name: &str, argument_fragments: &[&str]) -> Vec<String> {
    let mut lines = vec![format!(
        "data: {}",
        serde_json::json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": id, "type": "function", "function": {"name": name, "arguments": ""}}
        ]}}]})
    )];
    for fragment in argument_fragments {
        lines.push(format!(
            "data: {}",
            serde_json::json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": fragment}}
            ]}}]})
        ));
    }
    lines.push(r#"data: {"choices":[{"finish_reason":"tool_calls"}]}"#.to_string());
    lines.push("data: [DONE]".to_string());
    lines
}

/// Content of the tool-result block in `message`, if any
pub fn tool_result_content(message: &Message) -> Option<String> {
    message.content.iter().find_map(|c| match c {
        MessageContent::ToolResult { content, .. } => Some(content.clone()),
        _ => None,
    })
}

// ============================================================================
// Collaborators
// ============================================================================

/// Skill dispatcher with canned results, recording every call
#[derive(Default)]
pub struct RecordingSkills {
    named: HashMap<String, Option<String>>,
    legacy: Option<String>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl RecordingSkills {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: &str, result: Option<&str>) -> Self {
        self.named
            .insert(capability.to_string(), result.map(str::to_string));
        self
    }

    pub fn with_legacy(mut self, result: &str) -> Self {
        self.legacy = Some(result.to_string());
        self
    }

    pub fn called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, i)| i.clone())
            .collect()
    }
}

#[async_trait]
impl SkillDispatcher for RecordingSkills {
    async fn execute_capability(&self, input: &str) -> AppResult<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .push(("legacy".to_string(), input.to_string()));
        Ok(self.legacy.clone())
    }

    async fn execute_named(&self, capability: &str, input: &str) -> AppResult<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((capability.to_string(), input.to_string()));
        match self.named.get(capability) {
            Some(result) => Ok(result.clone()),
            None => Err(AppError::not_found(format!("skill {}", capability))),
        }
    }
}

/// Holds the first call to one capability until released
pub struct GatedSkills {
    pub inner: RecordingSkills,
    capability: String,
    gate: Notify,
    held: AtomicBool,
}

impl GatedSkills {
    pub fn new(inner: RecordingSkills, capability: &str) -> Self {
        Self {
            inner,
            capability: capability.to_string(),
            gate: Notify::new(),
            held: AtomicBool::new(false),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Yield until the gated call is waiting
    pub async fn wait_until_held(&self) {
        while !self.held.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl SkillDispatcher for GatedSkills {
    async fn execute_capability(&self, input: &str) -> AppResult<Option<String>> {
        self.inner.execute_capability(input).await
    }

    async fn execute_named(&self, capability: &str, input: &str) -> AppResult<Option<String>> {
        if capability == self.capability && !self.held.swap(true, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.execute_named(capability, input).await
    }
}

/// Similarity keyed on each capability's first example phrase
pub struct FixedScorer(pub HashMap<String, f32>);

impl FixedScorer {
    pub fn new(scores: &[(&str, f32)]) -> Self {
        Self(scores.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

#[async_trait]
impl SimilarityScorer for FixedScorer {
    async fn score(&self, _text: &str, examples: &[String]) -> AppResult<f32> {
        Ok(examples
            .first()
            .and_then(|e| self.0.get(e))
            .copied()
            .unwrap_or(0.0))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    pub facts: Mutex<Vec<String>>,
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn remember(&self, fact: &str) -> AppResult<()> {
        self.facts.lock().unwrap().push(fact.to_string());
        Ok(())
    }

    async fn recall(&self, topic: &str) -> AppResult<Vec<String>> {
        let topic = topic.to_lowercase();
        Ok(self
            .facts
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.to_lowercase().contains(&topic))
            .cloned()
            .collect())
    }

    async fn forget(&self, topic: &str) -> AppResult<usize> {
        let topic = topic.to_lowercase();
        let mut facts = self.facts.lock().unwrap();
        let before = facts.len();
        facts.retain(|f| !f.to_lowercase().contains(&topic));
        Ok(before - facts.len())
    }
}

/// Memory store whose backend is down
pub struct BrokenStore;

#[async_trait]
impl MemoryStore for BrokenStore {
    async fn remember(&self, _fact: &str) -> AppResult<()> {
        Err(AppError::collaborator("memory backend offline"))
    }

    async fn recall(&self, _topic: &str) -> AppResult<Vec<String>> {
        Err(AppError::collaborator("memory backend offline"))
    }

    async fn forget(&self, _topic: &str) -> AppResult<usize> {
        Err(AppError::collaborator("memory backend offline"))
    }
}

pub struct StaticResearch(pub Vec<ResearchResult>);

#[async_trait]
impl WebResearcher for StaticResearch {
    async fn search(&self, _query: &str) -> AppResult<Vec<ResearchResult>> {
        Ok(self.0.clone())
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub fn capabilities() -> Vec<Capability> {
    vec![
        Capability::new("weather", "Current weather and forecasts")
            .tool_enabled(true)
            .with_primary_argument("location")
            .with_examples(&["weather"]),
        Capability::new("time_zone", "Current time in another city")
            .tool_enabled(true)
            .with_primary_argument("city")
            .with_examples(&["time_zone"]),
        Capability::new("music", "Play music").with_examples(&["music"]),
        Capability::new("file_search", "Find files on this computer"),
        Capability::new("email", "Send an email"),
        Capability::new("shell", "Run a raw shell command").requires_confirmation(true),
    ]
}

pub fn app_config() -> parley::AppConfig {
    parley::AppConfig {
        capabilities: capabilities(),
        ..Default::default()
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
