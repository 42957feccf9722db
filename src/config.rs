//! Configuration
//!
//! `AppConfig` is read from a TOML file. Every section has defaults, so an
//! empty file yields a working local-only setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use parley_core::{Capability, CapabilityManifest};
use parley_llm::ProviderConfig;
use parley_quality_gates::QualityConfig;

use crate::utils::error::{AppError, AppResult};

/// Environment variable that supplies the remote provider's API key
pub const REMOTE_API_KEY_ENV: &str = "PARLEY_REMOTE_API_KEY";

/// What the router does when a handler returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Log the fault and treat it as a decline
    #[default]
    Lenient,
    /// Abort routing and return the fault
    Strict,
}

/// Router thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum similarity for a capability to be offered as a tool
    #[serde(default = "default_tool_score_threshold")]
    pub tool_score_threshold: f32,
    /// Maximum capabilities offered as tools at once (search tool excluded)
    #[serde(default = "default_max_tools")]
    pub max_tools: usize,
    /// Seconds the follow-up window stays open after a reply ending in a question
    #[serde(default = "default_follow_up_window_secs")]
    pub follow_up_window_secs: u64,
    #[serde(default)]
    pub fault_policy: FaultPolicy,
}

fn default_tool_score_threshold() -> f32 {
    0.45
}

fn default_max_tools() -> usize {
    3
}

fn default_follow_up_window_secs() -> u64 {
    8
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tool_score_threshold: default_tool_score_threshold(),
            max_tools: default_max_tools(),
            follow_up_window_secs: default_follow_up_window_secs(),
            fault_policy: FaultPolicy::default(),
        }
    }
}

/// Planner limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Upper bound on steps kept from a decomposition
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Capabilities that hold a plan for confirmation, in addition to those
    /// flagged on the capability itself
    #[serde(default)]
    pub confirmation_required: Vec<String>,
}

fn default_max_steps() -> usize {
    4
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            confirmation_required: Vec::new(),
        }
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local model server
    #[serde(default)]
    pub local: ProviderConfig,
    /// Remote fallback provider; absent disables the remote rung
    #[serde(default)]
    pub remote: Option<ProviderConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl AppConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, applying environment overrides.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_remote_api_key(std::env::var(REMOTE_API_KEY_ENV).ok());
        Ok(config)
    }

    /// Use `key` for the remote provider unless the file already set one
    pub fn apply_remote_api_key(&mut self, key: Option<String>) {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return;
        };
        if let Some(remote) = self.remote.as_mut() {
            if remote.api_key.is_none() {
                remote.api_key = Some(key);
            }
        }
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.router.tool_score_threshold) {
            return Err(AppError::config(format!(
                "router.tool_score_threshold must be within 0..=1, got {}",
                self.router.tool_score_threshold
            )));
        }
        if self.planner.max_steps < 2 {
            return Err(AppError::config("planner.max_steps must be at least 2"));
        }
        self.quality.validate()?;
        for name in &self.planner.confirmation_required {
            if !self.capabilities.iter().any(|c| &c.name == name) {
                return Err(AppError::config(format!(
                    "planner.confirmation_required names unknown capability '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Build the capability manifest, folding in planner confirmation flags
    pub fn manifest(&self) -> AppResult<CapabilityManifest> {
        let capabilities = self
            .capabilities
            .iter()
            .cloned()
            .map(|c| {
                if self.planner.confirmation_required.contains(&c.name) {
                    c.requires_confirmation(true)
                } else {
                    c
                }
            })
            .collect();
        Ok(CapabilityManifest::new(capabilities)?)
    }
}
