//! Tool Execution Results
//!
//! The outcome of running one tool call, rendered back to the model as the
//! content of a tool-result message.

use serde::{Deserialize, Serialize};

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the execution was successful
    pub success: bool,
    /// Output from the tool (if successful)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// Create an error result
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Result of a dispatch that may have produced nothing.
    ///
    /// Empty or whitespace-only output counts as a failure.
    pub fn from_dispatch(output: Option<String>, tool_name: &str) -> Self {
        match output {
            Some(text) if !text.trim().is_empty() => Self::ok(text),
            _ => Self::err(format!("{} returned no result", tool_name)),
        }
    }

    /// Content of the tool-result message sent back to the model
    pub fn to_content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}
