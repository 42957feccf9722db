//! Conversation State
//!
//! Per-conversation memory that survives between turns until the follow-up
//! window closes.

use serde::{Deserialize, Serialize};

use crate::utils::text::ends_with_question;

/// One cached web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// State mutated by router handlers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Source tag of the last decision that produced speech
    pub last_intent: Option<String>,
    /// Last text spoken to the user
    pub last_response: Option<String>,
    /// Whether the last spoken text ended with a question mark
    pub last_ended_with_question: bool,
    /// Results of the most recent web search, in rank order
    pub research: Vec<ResearchResult>,
    /// Result the user last asked about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_focus: Option<usize>,
    /// Topic staged by "forget ..." awaiting a yes/no
    pub pending_forget: Option<String>,
}

impl ConversationState {
    /// Record a spoken reply
    pub fn record_response(&mut self, source: &str, text: &str) {
        self.last_intent = Some(source.to_string());
        self.last_response = Some(text.to_string());
        self.last_ended_with_question = ends_with_question(text);
    }

    /// Replace cached research results
    pub fn cache_research(&mut self, results: Vec<ResearchResult>) {
        self.research = results;
        self.research_focus = None;
    }

    /// Forget everything; called when the follow-up window closes
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
