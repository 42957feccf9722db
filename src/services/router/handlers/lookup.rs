//! Domain lookups: saved facts and the results of the last web search.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::models::{Command, ConversationState, Decision};
use crate::services::collaborators::MemoryStore;
use crate::services::router::RouteHandler;
use crate::utils::error::AppResult;
use crate::utils::text::{is_one_of, normalize};

/// Facts read back for one recall
const MAX_RECALLED: usize = 3;

/// Words that never name a forget topic on their own
const VAGUE_TOPICS: &[&str] = &["it", "that", "this", "about it", "about that"];

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

/// "remember that ...", "what do you know about ...", "forget ..."
pub struct MemoryHandler {
    memory: Option<Arc<dyn MemoryStore>>,
    remember: Option<Regex>,
    recall: Option<Regex>,
    forget: Option<Regex>,
}

impl MemoryHandler {
    pub fn new(memory: Option<Arc<dyn MemoryStore>>) -> Self {
        Self {
            memory,
            remember: compile(r"(?i)^(?:please )?remember (?:that )?(.+?)[.!]?$"),
            recall: compile(r"^what do you (?:know|remember) about (.+)$"),
            forget: compile(r"^forget (?:about |everything about )?(.+)$"),
        }
    }

    fn capture(pattern: &Option<Regex>, text: &str) -> Option<String> {
        pattern
            .as_ref()?
            .captures(text)?
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl RouteHandler for MemoryHandler {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let Some(memory) = &self.memory else {
            return Ok(None);
        };
        let text = normalize(command.trimmed());

        // facts keep the user's own wording
        if let Some(fact) = Self::capture(&self.remember, command.trimmed()) {
            memory.remember(&fact).await?;
            return Ok(Some(Decision::resolved("memory", "Okay, I'll remember that.")));
        }

        if let Some(topic) = Self::capture(&self.recall, &text) {
            let facts = memory.recall(&topic).await?;
            debug!(topic = %topic, found = facts.len(), "memory recall");
            let reply = if facts.is_empty() {
                format!("I don't have anything saved about {}.", topic)
            } else {
                facts
                    .iter()
                    .take(MAX_RECALLED)
                    .map(|f| f.trim_end_matches('.').to_string())
                    .collect::<Vec<_>>()
                    .join(". ")
                    + "."
            };
            return Ok(Some(Decision::resolved("memory", reply)));
        }

        if let Some(topic) = Self::capture(&self.forget, &text) {
            if is_one_of(&topic, VAGUE_TOPICS) {
                return Ok(None);
            }
            let question = format!("Should I forget everything about {}?", topic);
            state.pending_forget = Some(topic);
            return Ok(Some(Decision::resolved("memory", question)));
        }

        Ok(None)
    }
}

/// Position words the user can use to pick a result
const ORDINALS: &[(&str, usize)] = &[
    ("first", 0),
    ("1st", 0),
    ("second", 1),
    ("2nd", 1),
    ("third", 2),
    ("3rd", 2),
    ("fourth", 3),
    ("4th", 3),
    ("fifth", 4),
    ("5th", 4),
];

const MORE_VOCABULARY: &[&str] = &[
    "tell me more",
    "more",
    "more about that",
    "more about it",
    "go on",
    "what else",
];

const SOURCE_VOCABULARY: &[&str] = &[
    "what's the source",
    "what is the source",
    "source",
    "where did you get that",
    "where did that come from",
    "where's that from",
];

enum FollowUp {
    More(usize),
    Source(usize),
}

/// Follow-ups on cached web search results
pub struct ResearchFollowUpHandler;

impl ResearchFollowUpHandler {
    fn ordinal(text: &str, results: usize) -> Option<usize> {
        if text.contains("last one") || text.contains("last result") {
            return results.checked_sub(1);
        }
        let words: Vec<&str> = text.split(' ').collect();
        ORDINALS
            .iter()
            .find(|(word, _)| words.contains(word))
            .map(|(_, index)| *index)
    }

    fn parse(text: &str, state: &ConversationState) -> Option<FollowUp> {
        let focus = state.research_focus.unwrap_or(0);
        if is_one_of(text, MORE_VOCABULARY) {
            return Some(FollowUp::More(focus));
        }
        if is_one_of(text, SOURCE_VOCABULARY) {
            return Some(FollowUp::Source(focus));
        }
        let asks_more = text.starts_with("more about the ")
            || text.starts_with("tell me more about the ")
            || text.starts_with("what about the ");
        if asks_more {
            return Self::ordinal(text, state.research.len()).map(FollowUp::More);
        }
        None
    }
}

#[async_trait]
impl RouteHandler for ResearchFollowUpHandler {
    fn name(&self) -> &'static str {
        "research_followup"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        if state.research.is_empty() {
            return Ok(None);
        }
        let text = normalize(command.trimmed());
        let Some(follow_up) = Self::parse(&text, state) else {
            return Ok(None);
        };

        let index = match follow_up {
            FollowUp::More(i) | FollowUp::Source(i) => i,
        };
        let Some(result) = state.research.get(index).cloned() else {
            return Ok(Some(Decision::resolved(
                "research",
                format!("I only found {} results.", state.research.len()),
            )));
        };
        state.research_focus = Some(index);

        let reply = match follow_up {
            FollowUp::More(_) => format!("{}. {}", result.title, result.snippet),
            FollowUp::Source(_) => match &result.source {
                Some(source) => format!("That came from {}.", source),
                None => "I don't have a source for that one.".to_string(),
            },
        };
        Ok(Some(Decision::resolved("research", reply)))
    }
}
