//! Output-length budget
//!
//! The max-token budget is picked from the shape of the command: short
//! acknowledgments get a small budget, explanation-style questions a large
//! one, everything else the default.

use std::sync::OnceLock;

use regex::Regex;

use parley_llm::types::LlmRequestOptions;

pub const SHORT_BUDGET: u32 = 64;
pub const DEFAULT_BUDGET: u32 = 200;
pub const DETAILED_BUDGET: u32 = 600;

/// Commands this short are answered briefly
const SHORT_WORD_LIMIT: usize = 2;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn short_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)^\s*(yes|no|yeah|yep|nope|ok|okay|sure|thanks|thank you|cool|great|nice|right)\b",
            r"(?i)^\s*(hi|hello|hey)\b",
        ])
    })
}

fn detailed_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)\b(explain|describe|compare|contrast|summari[sz]e|elaborate)\b",
            r"(?i)\b(difference|differences) between\b",
            r"(?i)\bpros and cons\b",
            r"(?i)\b(how|why) (does|do|did|is|are|would|could)\b",
            r"(?i)\bwalk me through\b",
            r"(?i)\bin detail\b",
        ])
    })
}

/// Max output tokens for a reply to `command`
pub fn output_budget(command: &str) -> u32 {
    if detailed_patterns().iter().any(|re| re.is_match(command)) {
        return DETAILED_BUDGET;
    }
    if command.split_whitespace().count() <= SHORT_WORD_LIMIT
        || short_patterns().iter().any(|re| re.is_match(command))
    {
        return SHORT_BUDGET;
    }
    DEFAULT_BUDGET
}

/// Request options carrying the budget for `command`
pub fn request_options(command: &str) -> LlmRequestOptions {
    LlmRequestOptions {
        max_tokens_override: Some(output_budget(command)),
        ..LlmRequestOptions::default()
    }
}
