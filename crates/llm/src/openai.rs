//! OpenAI-Compatible Provider
//!
//! Implementation of the LlmProvider trait for any server that speaks the
//! OpenAI chat-completions protocol: llama.cpp, Ollama, OpenAI itself and
//! hosted compatibles. Local servers run without an API key.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::provider::{missing_api_key_error, parse_http_error, LineStream, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageContent, MessageRole,
    ProviderConfig, StopReason, ToolCall, ToolCallMode, ToolDefinition, UsageStats,
};
use crate::http_client::build_http_client;

/// Buffered lines between the socket reader and the consumer
const LINE_CHANNEL_CAPACITY: usize = 64;

/// Provider for OpenAI-compatible chat-completions endpoints
pub struct OpenAICompatibleProvider {
    config: ProviderConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAICompatibleProvider {
    /// Create a provider from its configuration.
    ///
    /// Fails when no endpoint can be determined, or when a hosted provider
    /// has no API key.
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let endpoint = config
            .base_url
            .clone()
            .or_else(|| config.provider.default_endpoint().map(str::to_string))
            .ok_or_else(|| LlmError::InvalidRequest {
                message: format!("no endpoint configured for {} provider", config.provider),
            })?;

        if !config.provider.is_local() && config.base_url.is_none() && config.api_key.is_none() {
            return Err(missing_api_key_error(&config.provider.to_string()));
        }

        let client = build_http_client(&config)?;
        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    /// Chat-completions endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolDefinition],
        stream: bool,
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": request_options
                .max_tokens_override
                .unwrap_or(self.config.max_tokens),
            "temperature": request_options
                .temperature_override
                .unwrap_or(self.config.temperature),
            "stream": stream,
        });

        let mut openai_messages: Vec<serde_json::Value> = Vec::new();
        if let Some(sys) = system {
            openai_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        openai_messages.extend(messages.iter().map(message_to_openai));
        body["messages"] = serde_json::json!(openai_messages);

        if !tools.is_empty() && request_options.tool_call_mode != ToolCallMode::None {
            let openai_tools: Vec<serde_json::Value> = tools.iter().map(tool_to_openai).collect();
            body["tools"] = serde_json::json!(openai_tools);
            if request_options.tool_call_mode == ToolCallMode::Required {
                body["tool_choice"] = serde_json::json!("required");
            }
        }

        if let Some(obj) = body.as_object_mut() {
            for (key, value) in &self.config.options {
                obj.insert(key.clone(), value.clone());
            }
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> LlmResult<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = response.text().await.unwrap_or_default();
            return Err(parse_http_error(
                status,
                &body_text,
                &self.config.provider.to_string(),
            ));
        }
        Ok(response)
    }

    /// Parse a non-streaming response
    fn parse_response(&self, response: OpenAIResponse) -> LlmResponse {
        let choice = response.choices.into_iter().next();

        let mut content = None;
        let mut tool_calls = Vec::new();
        let mut stop_reason = StopReason::EndTurn;

        if let Some(choice) = choice {
            if let Some(reason) = &choice.finish_reason {
                stop_reason = StopReason::from(reason.as_str());
            }
            if let Some(msg) = choice.message {
                content = msg.content.filter(|c| !c.is_empty());
                for tc in msg.tool_calls.unwrap_or_default() {
                    tool_calls.push(ToolCall::from_raw_arguments(
                        tc.id,
                        tc.function.name,
                        &tc.function.arguments,
                        "input",
                    ));
                }
            }
        }

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
        }
    }
}

/// Convert a Message to OpenAI API format
fn message_to_openai(message: &Message) -> serde_json::Value {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    };

    for content in &message.content {
        if let MessageContent::ToolResult {
            tool_use_id,
            content,
        } = content
        {
            return serde_json::json!({
                "role": "tool",
                "tool_call_id": tool_use_id,
                "content": content
            });
        }
    }

    let tool_calls: Vec<serde_json::Value> = message
        .content
        .iter()
        .filter_map(|c| match c {
            MessageContent::ToolUse { id, name, input } => Some(serde_json::json!({
                "id": id,
                "type": "function",
                "function": {
                    "name": name,
                    "arguments": serde_json::Value::Object(input.clone()).to_string()
                }
            })),
            _ => None,
        })
        .collect();

    let text = message.text_content();

    if !tool_calls.is_empty() {
        // Some compatible servers reject a missing content field
        return serde_json::json!({
            "role": role,
            "content": if text.is_empty() { serde_json::Value::Null } else { serde_json::json!(text) },
            "tool_calls": tool_calls
        });
    }

    serde_json::json!({
        "role": role,
        "content": text
    })
}

/// Convert a ToolDefinition to OpenAI API format
fn tool_to_openai(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema
        }
    })
}

/// Split complete lines off the front of `buffer`, keeping any partial tail.
pub fn drain_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line_end) = buffer.find('\n') {
        let line = buffer[..line_end].trim_end_matches('\r').to_string();
        buffer.drain(..=line_end);
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    lines
}

#[async_trait]
impl LlmProvider for OpenAICompatibleProvider {
    fn name(&self) -> &'static str {
        match self.config.provider {
            super::types::ProviderType::LlamaCpp => "llama_cpp",
            super::types::ProviderType::Ollama => "ollama",
            super::types::ProviderType::OpenAI => "openai",
            super::types::ProviderType::Compatible => "compatible",
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let body = self.build_request_body(
            &messages,
            system.as_deref(),
            &tools,
            false,
            &request_options,
        );

        let response = self.post(&body).await?;
        let body_text = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let parsed: OpenAIResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(self.parse_response(parsed))
    }

    async fn stream_lines(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LineStream> {
        let body =
            self.build_request_body(&messages, system.as_deref(), &tools, true, &request_options);
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel::<LlmResult<String>>(LINE_CHANNEL_CAPACITY);
        let provider = self.name();

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(provider, error = %e, "stream read failed");
                        let _ = tx.send(Err(LlmError::from_transport(&e))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                for line in drain_lines(&mut buffer) {
                    if tx.send(Ok(line)).await.is_err() {
                        debug!(provider, "line consumer dropped; closing stream");
                        return;
                    }
                }
            }

            let tail = buffer.trim();
            if !tail.is_empty() {
                let _ = tx.send(Ok(tail.to_string())).await;
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn health_check(&self) -> LlmResult<()> {
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "Hi"}],
        });
        self.post(&body).await.map(|_| ())
    }
}

/// Non-streaming response from the API
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    #[serde(default)]
    message: Option<OpenAIMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
