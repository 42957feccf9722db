//! Parley LLM
//!
//! Provider abstraction for OpenAI-compatible chat-completion servers.
//!
//! ## Modules
//!
//! - `types` - Messages, tool definitions, responses and errors
//! - `provider` - The `LlmProvider` trait and HTTP error mapping
//! - `openai` - Provider for any OpenAI-compatible endpoint
//! - `streaming_adapters` - SSE line to unified event conversion
//! - `http_client` - Timeout-bounded reqwest client construction

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod streaming_adapters;
pub mod types;

pub use http_client::build_http_client;
pub use openai::{drain_lines, OpenAICompatibleProvider};
pub use provider::{
    is_context_overflow_body, missing_api_key_error, parse_http_error, LineStream, LlmProvider,
};
pub use streaming_adapters::OpenAIAdapter;
pub use types::*;
