//! Command Model

use serde::{Deserialize, Serialize};

use crate::utils::text::normalize;

/// One user utterance, created per turn and discarded once a decision is made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Raw utterance text
    pub text: String,
    /// Whether the utterance arrived inside an open follow-up window
    #[serde(default)]
    pub in_follow_up_window: bool,
    /// Optional attached document context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            in_follow_up_window: false,
            document: None,
        }
    }

    /// Mark whether the follow-up window is open
    pub fn in_window(mut self, open: bool) -> Self {
        self.in_follow_up_window = open;
        self
    }

    /// Attach document context
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Normalized text for vocabulary matching
    pub fn normalized(&self) -> String {
        normalize(&self.text)
    }

    /// Trimmed raw text
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}
