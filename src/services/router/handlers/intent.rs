//! General Intent
//!
//! Rule-based recognition of small talk and clock questions, answered
//! without a model round trip. Patterns are anchored so only short,
//! self-contained utterances match.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::Regex;

use crate::models::{Command, ConversationState, Decision};
use crate::services::router::RouteHandler;
use crate::utils::error::AppResult;
use crate::utils::text::normalize;

/// Intents answered directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralIntent {
    Greeting,
    Thanks,
    Time,
    Date,
    Repeat,
    Stop,
}

impl std::fmt::Display for GeneralIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneralIntent::Greeting => write!(f, "greeting"),
            GeneralIntent::Thanks => write!(f, "thanks"),
            GeneralIntent::Time => write!(f, "time"),
            GeneralIntent::Date => write!(f, "date"),
            GeneralIntent::Repeat => write!(f, "repeat"),
            GeneralIntent::Stop => write!(f, "stop"),
        }
    }
}

/// Regex rules, checked in declaration order on normalized text
pub struct IntentClassifier {
    rules: Vec<(GeneralIntent, Vec<Regex>)>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            rules: vec![
                (
                    GeneralIntent::Greeting,
                    Self::compile(&[
                        r"^(hi|hello|hey|hiya|howdy)( there)?$",
                        r"^good (morning|afternoon|evening)$",
                    ]),
                ),
                (
                    GeneralIntent::Thanks,
                    Self::compile(&[r"^(thanks|thank you|cheers|thx)( (so|very) much)?$"]),
                ),
                (
                    GeneralIntent::Time,
                    Self::compile(&[
                        r"^what time is it( now)?$",
                        r"^what's the time( now)?$",
                        r"^what is the time( now)?$",
                    ]),
                ),
                (
                    GeneralIntent::Date,
                    Self::compile(&[
                        r"^what('s| is) (the date|today's date)( today)?$",
                        r"^what day is (it|today)$",
                    ]),
                ),
                (
                    GeneralIntent::Repeat,
                    Self::compile(&[
                        r"^(say that again|repeat that|repeat|come again|pardon)$",
                        r"^what did you (just )?say$",
                    ]),
                ),
                (
                    GeneralIntent::Stop,
                    Self::compile(&[r"^(stop|be quiet|quiet|shut up|that's all|goodbye|bye)$"]),
                ),
            ],
        }
    }

    fn compile(patterns: &[&str]) -> Vec<Regex> {
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    }

    pub fn classify(&self, text: &str) -> Option<GeneralIntent> {
        let normalized = normalize(text);
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(&normalized)))
            .map(|(intent, _)| *intent)
    }
}

/// Spoken answer for a recognized intent
pub(crate) fn answer(
    intent: GeneralIntent,
    state: &ConversationState,
    now: DateTime<Local>,
) -> Decision {
    match intent {
        GeneralIntent::Greeting => Decision::resolved("greeting", "Hi! What can I do for you?"),
        GeneralIntent::Thanks => Decision::resolved("thanks", "You're welcome."),
        GeneralIntent::Time => {
            Decision::resolved("time", now.format("It's %-I:%M %p.").to_string())
        }
        GeneralIntent::Date => {
            Decision::resolved("date", now.format("Today is %A, %B %-d.").to_string())
        }
        GeneralIntent::Repeat => match &state.last_response {
            Some(last) => Decision::resolved("repeat", last.clone()),
            None => Decision::resolved("repeat", "I haven't said anything yet."),
        },
        GeneralIntent::Stop => Decision::resolved("stop", "Okay.").close_window(),
    }
}

/// Answers greetings, thanks, clock questions, repeat and stop
pub struct GeneralIntentHandler {
    classifier: IntentClassifier,
}

impl GeneralIntentHandler {
    pub fn new() -> Self {
        Self {
            classifier: IntentClassifier::new(),
        }
    }
}

impl Default for GeneralIntentHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteHandler for GeneralIntentHandler {
    fn name(&self) -> &'static str {
        "general_intent"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        Ok(self
            .classifier
            .classify(command.trimmed())
            .map(|intent| answer(intent, state, Local::now())))
    }
}
