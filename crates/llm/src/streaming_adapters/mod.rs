//! Provider-Specific Stream Adapters
//!
//! Each adapter handles the unique streaming format of its provider. All
//! supported servers speak the OpenAI chat-completions SSE dialect.

pub mod openai;

pub use openai::OpenAIAdapter;
