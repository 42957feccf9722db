//! Capability Descriptors
//!
//! A capability is a named skill the assistant can invoke. It is reachable
//! either through legacy skill dispatch or, when `tool_enabled` is set, as a
//! tool schema offered to the model. The manifest renders one line per
//! capability and is injected verbatim into the planning prompt.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Pseudo-capability: free-form synthesis by the model.
pub const SYNTHESIZE_CAPABILITY: &str = "synthesize";

/// Pseudo-capability: open-web research.
pub const RESEARCH_CAPABILITY: &str = "research";

/// A single capability definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    /// Unique capability name (e.g. "weather", "file_search")
    pub name: String,
    /// One-line description shown to the model
    pub description: String,
    /// Whether the capability is exposed as a tool schema
    #[serde(default)]
    pub tool_enabled: bool,
    /// Whether a plan step targeting this capability needs explicit confirmation
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Example phrases used for similarity scoring
    #[serde(default)]
    pub examples: Vec<String>,
    /// Name of the argument a free-text payload is wrapped into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_argument: Option<String>,
}

impl Capability {
    /// Create a new capability with no examples.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tool_enabled: false,
            requires_confirmation: false,
            examples: Vec::new(),
            primary_argument: None,
        }
    }

    /// Mark as exposed to the model as a tool
    pub fn tool_enabled(mut self, enabled: bool) -> Self {
        self.tool_enabled = enabled;
        self
    }

    /// Mark as requiring confirmation before execution inside a plan
    pub fn requires_confirmation(mut self, required: bool) -> Self {
        self.requires_confirmation = required;
        self
    }

    /// Set the example phrases
    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Set the primary argument name
    pub fn with_primary_argument(mut self, name: impl Into<String>) -> Self {
        self.primary_argument = Some(name.into());
        self
    }

    /// The argument name free text is wrapped into.
    pub fn argument_name(&self) -> &str {
        self.primary_argument.as_deref().unwrap_or("input")
    }
}

/// The set of capabilities known to this assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityManifest {
    capabilities: Vec<Capability>,
}

impl CapabilityManifest {
    /// Build a manifest, rejecting duplicate or reserved names.
    pub fn new(capabilities: Vec<Capability>) -> CoreResult<Self> {
        let mut seen = HashSet::new();
        for cap in &capabilities {
            let name = cap.name.trim();
            if name.is_empty() {
                return Err(CoreError::validation("capability name must not be empty"));
            }
            if is_pseudo_capability(name) {
                return Err(CoreError::validation(format!(
                    "capability name '{}' is reserved",
                    name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(CoreError::validation(format!(
                    "duplicate capability '{}'",
                    name
                )));
            }
        }
        Ok(Self { capabilities })
    }

    /// Look up a capability by name
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// Iterate over all registered capabilities in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Number of registered capabilities (pseudo-capabilities excluded)
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether no capabilities are registered
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Whether `name` is a valid plan step target, pseudo-capabilities included.
    pub fn is_valid_target(&self, name: &str) -> bool {
        is_pseudo_capability(name) || self.get(name).is_some()
    }

    /// Whether a step targeting `name` must be confirmed before the plan runs.
    pub fn requires_confirmation(&self, name: &str) -> bool {
        self.get(name).map_or(false, |c| c.requires_confirmation)
    }

    /// Capabilities exposed as tools
    pub fn tool_enabled(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter().filter(|c| c.tool_enabled)
    }

    /// Render the manifest, one line per capability.
    pub fn manifest_text(&self) -> String {
        let mut lines: Vec<String> = self
            .capabilities
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.description))
            .collect();
        lines.push(format!(
            "- {}: compose an answer from earlier results or general knowledge",
            SYNTHESIZE_CAPABILITY
        ));
        lines.push(format!(
            "- {}: search the open web for current information",
            RESEARCH_CAPABILITY
        ));
        lines.join("\n")
    }
}

/// Whether `name` is one of the built-in pseudo-capabilities.
pub fn is_pseudo_capability(name: &str) -> bool {
    name == SYNTHESIZE_CAPABILITY || name == RESEARCH_CAPABILITY
}
