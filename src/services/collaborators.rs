//! External Collaborators
//!
//! Interfaces to the systems this engine consumes but does not implement:
//! skill dispatch, phrase similarity, fact memory, reminders and web search.
//! Every collaborator is optional. `Collaborators` resolves presence once at
//! construction, and handlers decline when the one they need is absent.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::ResearchResult;
use crate::utils::error::AppResult;

/// Executes capabilities outside the model
#[async_trait]
pub trait SkillDispatcher: Send + Sync {
    /// Legacy dispatch: pick and run a skill from free text.
    ///
    /// `Ok(None)` means no skill claimed the input.
    async fn execute_capability(&self, input: &str) -> AppResult<Option<String>>;

    /// Run a specific capability with the given input
    async fn execute_named(&self, capability: &str, input: &str) -> AppResult<Option<String>>;
}

/// Scores how close an utterance is to a set of example phrases
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// Similarity in `0.0..=1.0`; the best match over `examples`
    async fn score(&self, text: &str, examples: &[String]) -> AppResult<f32>;
}

/// Long-term fact storage
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn remember(&self, fact: &str) -> AppResult<()>;

    /// Facts related to `topic`, most relevant first
    async fn recall(&self, topic: &str) -> AppResult<Vec<String>>;

    /// Remove facts about `topic`; returns how many were removed
    async fn forget(&self, topic: &str) -> AppResult<usize>;
}

/// A reminder that has fired and is waiting to be acknowledged
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReminder {
    pub id: String,
    pub text: String,
}

/// Reminder delivery
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    /// The reminder currently awaiting acknowledgment, if any
    async fn pending(&self) -> AppResult<Option<PendingReminder>>;

    async fn acknowledge(&self, id: &str) -> AppResult<()>;

    async fn snooze(&self, id: &str, minutes: u32) -> AppResult<()>;
}

/// Open-web search
#[async_trait]
pub trait WebResearcher: Send + Sync {
    async fn search(&self, query: &str) -> AppResult<Vec<ResearchResult>>;
}

/// The set of collaborators available to one conversation
#[derive(Clone, Default)]
pub struct Collaborators {
    pub skills: Option<Arc<dyn SkillDispatcher>>,
    pub scorer: Option<Arc<dyn SimilarityScorer>>,
    pub memory: Option<Arc<dyn MemoryStore>>,
    pub reminders: Option<Arc<dyn ReminderNotifier>>,
    pub research: Option<Arc<dyn WebResearcher>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillDispatcher>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_reminders(mut self, reminders: Arc<dyn ReminderNotifier>) -> Self {
        self.reminders = Some(reminders);
        self
    }

    pub fn with_research(mut self, research: Arc<dyn WebResearcher>) -> Self {
        self.research = Some(research);
        self
    }

    /// Names of the collaborators that are present, for startup logging
    pub fn present(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.skills.is_some() {
            names.push("skills");
        }
        if self.scorer.is_some() {
            names.push("scorer");
        }
        if self.memory.is_some() {
            names.push("memory");
        }
        if self.reminders.is_some() {
            names.push("reminders");
        }
        if self.research.is_some() {
            names.push("research");
        }
        names
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("present", &self.present())
            .finish()
    }
}
