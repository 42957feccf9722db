//! Quality Validators
//!
//! Each validator inspects one reply against the command that produced it.
//! Validators are pure functions and never fail to run.

use std::collections::HashSet;

use crate::models::{QualityConfig, QualityFailure};

/// The text under test and the command it answers
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub command: &'a str,
    pub reply: &'a str,
}

impl<'a> GateInput<'a> {
    pub fn new(command: &'a str, reply: &'a str) -> Self {
        Self { command, reply }
    }
}

/// Signature shared by every validator
pub type Validator = fn(&GateInput<'_>, &QualityConfig) -> Option<QualityFailure>;

/// Lowercase, strip punctuation and collapse whitespace
pub fn normalize_for_echo(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn check_empty(input: &GateInput<'_>, _config: &QualityConfig) -> Option<QualityFailure> {
    input.reply.trim().is_empty().then_some(QualityFailure::Empty)
}

pub fn check_length(input: &GateInput<'_>, config: &QualityConfig) -> Option<QualityFailure> {
    let chars = input.reply.trim().chars().count();
    (chars < config.min_chars).then_some(QualityFailure::TooShort { chars })
}

pub fn check_repetition(input: &GateInput<'_>, config: &QualityConfig) -> Option<QualityFailure> {
    let normalized = normalize_for_echo(input.reply);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.len() < config.min_tokens_for_ratio.max(1) {
        return None;
    }
    let unique: HashSet<&str> = tokens.iter().copied().collect();
    let ratio = unique.len() as f32 / tokens.len() as f32;
    (ratio < config.min_unique_token_ratio).then_some(QualityFailure::Repetitive { ratio })
}

/// The reply repeats the command back, ignoring case and punctuation
pub fn check_echo(input: &GateInput<'_>, _config: &QualityConfig) -> Option<QualityFailure> {
    let command = normalize_for_echo(input.command);
    if command.is_empty() {
        return None;
    }
    (normalize_for_echo(input.reply) == command).then_some(QualityFailure::Echo)
}

pub fn check_artifacts(input: &GateInput<'_>, config: &QualityConfig) -> Option<QualityFailure> {
    config
        .artifact_markers
        .iter()
        .find(|marker| input.reply.contains(marker.as_str()))
        .map(|marker| QualityFailure::TemplateArtifact {
            marker: marker.clone(),
        })
}
