//! LLM Provider Trait
//!
//! Defines the common interface for chat-completion providers.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig, ToolDefinition,
};

/// Raw response lines of a streaming request, in arrival order.
pub type LineStream = BoxStream<'static, LlmResult<String>>;

/// Trait that all providers must implement.
///
/// Provides a unified interface for:
/// - Single message completions (send_message)
/// - Streaming completions as raw wire lines (stream_lines)
/// - Health checking
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Returns whether this provider supports tool calling.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;

    /// Send a message and get a complete response.
    ///
    /// # Arguments
    /// * `messages` - Conversation messages, system messages included
    /// * `system` - Optional system prompt placed before `messages`
    /// * `tools` - Available tools for the model to use
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Open a streaming request and return its raw lines.
    ///
    /// The request is sent before this returns, so HTTP-level failures
    /// (including context overflow) surface here rather than mid-stream.
    async fn stream_lines(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LineStream>;

    /// Check if the provider is healthy and reachable.
    async fn health_check(&self) -> LlmResult<()>;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Phrases servers use when a prompt does not fit the context window.
const CONTEXT_OVERFLOW_MARKERS: &[&str] = &[
    "context_length_exceeded",
    "context length",
    "context window",
    "maximum context",
    "exceeds the available context",
    "exceed_context_size",
    "n_ctx",
    "too many tokens",
];

/// Whether an error body describes a context-window overflow
pub fn is_context_overflow_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    CONTEXT_OVERFLOW_MARKERS.iter().any(|m| lower.contains(m))
}

/// Helper function to parse HTTP error status codes
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    if matches!(status, 400 | 413 | 500) && is_context_overflow_body(body) {
        return LlmError::ContextLengthExceeded {
            message: body.to_string(),
        };
    }

    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
