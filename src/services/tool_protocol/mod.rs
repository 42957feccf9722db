//! Tool Protocol Client
//!
//! Streams chat completions from the local model server, surfaces tool calls
//! as structured items, resumes generation after a tool runs, and applies the
//! quality-gated local → nudged local → remote fallback for plain chat.

pub mod budget;
pub mod client;
pub mod stream;

pub use budget::{output_budget, request_options};
pub use client::{
    trim_history, AttemptFailure, AttemptSource, ChatAttempt, ChatOutcome, ToolProtocolClient,
    GENERIC_FALLBACK_REPLY, TRIM_KEEP_RECENT,
};
pub use stream::{collect_stream, tool_stream, StreamItem, ToolStream};
