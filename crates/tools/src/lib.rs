//! Parley Tools
//!
//! Bridges capabilities and the model's tool-calling protocol:
//! - `definitions` - tool schemas built from capabilities, plus the general search tool
//! - `arguments` - tolerant parsing of streamed arguments and rendering for dispatch
//! - `executor` - the `ToolResult` fed back to the model after execution

pub mod arguments;
pub mod definitions;
pub mod executor;

pub use arguments::{argument_text, fallback_argument_key, parse_tool_call};
pub use definitions::{build_tool_list, capability_tool, web_search_tool, WEB_SEARCH_TOOL};
pub use executor::ToolResult;
