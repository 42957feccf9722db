//! Decision Model
//!
//! The router's output for one command: resolved text, a bundle the caller
//! hands to the tool protocol client, or a plan the caller runs.

use serde::{Deserialize, Serialize};

use crate::services::planner::Plan;
use parley_llm::types::{LlmRequestOptions, Message, ToolDefinition};

/// Side effects the caller applies after delivering a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideEffects {
    /// Open the follow-up window for this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_window_secs: Option<u64>,
    /// Close the follow-up window and clear conversation state
    #[serde(default)]
    pub close_window: bool,
    /// Say nothing at all
    #[serde(default)]
    pub drop_silently: bool,
}

/// Everything the tool protocol client needs to answer a deferred command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferBundle {
    /// Role-tagged messages; exactly [system, user] when `tools` is non-empty
    pub messages: Vec<Message>,
    /// Tool schemas offered to the model; empty for plain chat
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Sampling overrides, including the output-length budget
    #[serde(default)]
    pub options: LlmRequestOptions,
    /// The command text, used for quality gating
    pub command: String,
}

impl DeferBundle {
    pub fn uses_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// Terminal or deferring router output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Resolved response text; `None` means the model must still be consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Capability or handler that produced this decision
    pub source: String,
    #[serde(default)]
    pub effects: SideEffects,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer: Option<DeferBundle>,
    /// Plan to run once routing has released the conversation state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

impl Decision {
    /// A resolved response
    pub fn resolved(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            source: source.into(),
            effects: SideEffects::default(),
            defer: None,
            plan: None,
        }
    }

    /// Drop the command without a response and close the window
    pub fn drop_silently(source: impl Into<String>) -> Self {
        Self {
            text: None,
            source: source.into(),
            effects: SideEffects {
                open_window_secs: None,
                close_window: true,
                drop_silently: true,
            },
            defer: None,
            plan: None,
        }
    }

    /// Hand the command to the model
    pub fn defer(source: impl Into<String>, bundle: DeferBundle) -> Self {
        Self {
            text: None,
            source: source.into(),
            effects: SideEffects::default(),
            defer: Some(bundle),
            plan: None,
        }
    }

    /// Hand a ready plan to the caller
    pub fn run_plan(source: impl Into<String>, plan: Plan) -> Self {
        Self {
            text: None,
            source: source.into(),
            effects: SideEffects::default(),
            defer: None,
            plan: Some(plan),
        }
    }

    pub fn open_window(mut self, secs: u64) -> Self {
        self.effects.open_window_secs = Some(secs);
        self
    }

    pub fn close_window(mut self) -> Self {
        self.effects.close_window = true;
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.defer.is_some()
    }

    pub fn is_dropped(&self) -> bool {
        self.effects.drop_silently
    }

    pub fn runs_plan(&self) -> bool {
        self.plan.is_some()
    }
}
