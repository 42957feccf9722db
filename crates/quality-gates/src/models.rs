//! Quality Gate Models
//!
//! Data structures for gate outcomes and gate configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use parley_core::{CoreError, CoreResult};

/// Quality gate status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    /// Gate passed
    Passed,
    /// Gate rejected the text
    Failed,
    /// Gate did not run because an earlier gate failed
    Skipped,
}

impl GateStatus {
    /// Check if this status indicates success
    pub fn is_success(&self) -> bool {
        matches!(self, GateStatus::Passed | GateStatus::Skipped)
    }

    /// Check if this status indicates failure
    pub fn is_failure(&self) -> bool {
        matches!(self, GateStatus::Failed)
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateStatus::Passed => write!(f, "passed"),
            GateStatus::Failed => write!(f, "failed"),
            GateStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a piece of generated text was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityFailure {
    #[error("reply is empty")]
    Empty,

    #[error("reply is too short ({chars} chars)")]
    TooShort { chars: usize },

    #[error("reply is repetitive (unique token ratio {ratio:.2})")]
    Repetitive { ratio: f32 },

    #[error("reply echoes the input")]
    Echo,

    #[error("reply contains template artifact {marker:?}")]
    TemplateArtifact { marker: String },
}

/// Outcome of one gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Gate identifier
    pub gate_id: String,
    /// Status of the gate
    pub status: GateStatus,
    /// Failure detail when the gate failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<QualityFailure>,
}

impl GateResult {
    pub fn passed(gate_id: &str) -> Self {
        Self {
            gate_id: gate_id.to_string(),
            status: GateStatus::Passed,
            failure: None,
        }
    }

    pub fn failed(gate_id: &str, failure: QualityFailure) -> Self {
        Self {
            gate_id: gate_id.to_string(),
            status: GateStatus::Failed,
            failure: Some(failure),
        }
    }

    pub fn skipped(gate_id: &str) -> Self {
        Self {
            gate_id: gate_id.to_string(),
            status: GateStatus::Skipped,
            failure: None,
        }
    }
}

/// Outcome of a full pipeline run over one reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub results: Vec<GateResult>,
}

impl QualityVerdict {
    /// Whether every gate passed
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }

    /// The failure that stopped the pipeline, if any
    pub fn failure(&self) -> Option<&QualityFailure> {
        self.results.iter().find_map(|r| r.failure.as_ref())
    }
}

/// Thresholds for the quality gates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum trimmed character count
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Minimum ratio of distinct tokens to total tokens
    #[serde(default = "default_min_unique_token_ratio")]
    pub min_unique_token_ratio: f32,
    /// Replies with fewer tokens skip the repetition check
    #[serde(default = "default_min_tokens_for_ratio")]
    pub min_tokens_for_ratio: usize,
    /// Substrings that only appear when a chat template leaks into the output
    #[serde(default = "default_artifact_markers")]
    pub artifact_markers: Vec<String>,
}

fn default_min_chars() -> usize {
    2
}

fn default_min_unique_token_ratio() -> f32 {
    0.35
}

fn default_min_tokens_for_ratio() -> usize {
    8
}

fn default_artifact_markers() -> Vec<String> {
    [
        "<|", "|>", "[INST]", "[/INST]", "<tool_call>", "</tool_call>", "<s>", "</s>",
        "<think>", "</think>", "```tool_call",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            min_unique_token_ratio: default_min_unique_token_ratio(),
            min_tokens_for_ratio: default_min_tokens_for_ratio(),
            artifact_markers: default_artifact_markers(),
        }
    }
}

impl QualityConfig {
    /// Reject thresholds that can never be satisfied
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&self.min_unique_token_ratio) {
            return Err(CoreError::config(format!(
                "quality.min_unique_token_ratio must be within 0..=1, got {}",
                self.min_unique_token_ratio
            )));
        }
        if self.artifact_markers.iter().any(|m| m.is_empty()) {
            return Err(CoreError::config(
                "quality.artifact_markers must not contain empty strings",
            ));
        }
        Ok(())
    }
}
