//! Handlers for questions the assistant is waiting on: plan confirmation,
//! forget confirmation and fired reminders.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::models::{Command, ConversationState, Decision};
use crate::services::collaborators::{MemoryStore, ReminderNotifier};
use crate::services::planner::interrupt::{PAUSE_VOCABULARY, RESUME_VOCABULARY};
use crate::services::planner::{Confirmation, InterruptSignal, Planner};
use crate::services::router::RouteHandler;
use crate::utils::error::AppResult;
use crate::utils::text::{is_one_of, normalize};

pub const YES_VOCABULARY: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "yup",
    "sure",
    "ok",
    "okay",
    "go ahead",
    "do it",
    "confirm",
    "yes please",
    "please do",
];

pub const NO_VOCABULARY: &[&str] = &[
    "no",
    "nope",
    "no thanks",
    "cancel",
    "never mind",
    "stop",
    "don't",
    "do not",
    "don't do it",
];

const SNOOZE_VOCABULARY: &[&str] = &["snooze", "later", "remind me later", "not now"];
const ACK_VOCABULARY: &[&str] = &[
    "ok", "okay", "got it", "thanks", "thank you", "done", "dismiss", "i know", "stop",
];

/// Minutes a snoozed reminder waits
const SNOOZE_MINUTES: u32 = 10;

/// Confirms or denies a held plan, and controls a running one
pub struct PlanControlHandler {
    planner: Arc<Planner>,
}

impl PlanControlHandler {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl RouteHandler for PlanControlHandler {
    fn name(&self) -> &'static str {
        "plan_control"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        _state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let text = command.trimmed();

        if self.planner.has_pending_confirmation() {
            let confirmed = if is_one_of(text, YES_VOCABULARY) {
                true
            } else if is_one_of(text, NO_VOCABULARY) {
                false
            } else {
                return Ok(None);
            };
            return Ok(match self.planner.resolve_confirmation(confirmed) {
                Confirmation::Confirmed(plan) => Some(Decision::run_plan("plan", plan)),
                Confirmation::Denied(_) => {
                    Some(Decision::resolved("plan", "Okay, I won't do that."))
                }
                Confirmation::NothingPending => None,
            });
        }

        if !self.planner.is_active() {
            return Ok(None);
        }

        let reply = match InterruptSignal::classify(text) {
            InterruptSignal::Cancel if self.planner.cancel() => "Okay, stopping.",
            InterruptSignal::Skip if self.planner.skip() => "Skipping that step.",
            _ if is_one_of(text, PAUSE_VOCABULARY) && self.planner.pause() => "Paused.",
            _ if is_one_of(text, RESUME_VOCABULARY) && self.planner.resume() => "Resuming.",
            _ => return Ok(None),
        };
        Ok(Some(Decision::resolved("plan_control", reply)))
    }
}

/// Resolves a staged "forget ..." with the next yes or no
pub struct ForgetConfirmationHandler {
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ForgetConfirmationHandler {
    pub fn new(memory: Option<Arc<dyn MemoryStore>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl RouteHandler for ForgetConfirmationHandler {
    fn name(&self) -> &'static str {
        "forget_confirmation"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let (Some(memory), Some(topic)) = (&self.memory, state.pending_forget.clone()) else {
            return Ok(None);
        };
        let text = command.trimmed();

        if is_one_of(text, YES_VOCABULARY) {
            let removed = memory.forget(&topic).await?;
            state.pending_forget = None;
            info!(topic = %topic, removed, "memory forgotten");
            let reply = match removed {
                0 => format!("I didn't have anything saved about {}.", topic),
                1 => format!("Done. I forgot one thing about {}.", topic),
                n => format!("Done. I forgot {} things about {}.", n, topic),
            };
            return Ok(Some(Decision::resolved("memory", reply)));
        }

        if is_one_of(text, NO_VOCABULARY) {
            state.pending_forget = None;
            return Ok(Some(Decision::resolved("memory", "Okay, I'll keep it.")));
        }

        Ok(None)
    }
}

/// Acknowledges or snoozes a reminder that is waiting for the user
pub struct ReminderAckHandler {
    reminders: Option<Arc<dyn ReminderNotifier>>,
}

impl ReminderAckHandler {
    pub fn new(reminders: Option<Arc<dyn ReminderNotifier>>) -> Self {
        Self { reminders }
    }
}

#[async_trait]
impl RouteHandler for ReminderAckHandler {
    fn name(&self) -> &'static str {
        "reminder_ack"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        _state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let Some(reminders) = &self.reminders else {
            return Ok(None);
        };
        let text = normalize(command.trimmed());
        let snooze = is_one_of(&text, SNOOZE_VOCABULARY) || text.starts_with("snooze ");
        let acknowledge = is_one_of(&text, ACK_VOCABULARY);
        if !snooze && !acknowledge {
            return Ok(None);
        }
        let Some(reminder) = reminders.pending().await? else {
            return Ok(None);
        };

        if snooze {
            reminders.snooze(&reminder.id, SNOOZE_MINUTES).await?;
            return Ok(Some(Decision::resolved(
                "reminder",
                format!("Okay, I'll remind you again in {} minutes.", SNOOZE_MINUTES),
            )));
        }

        reminders.acknowledge(&reminder.id).await?;
        Ok(Some(
            Decision::resolved("reminder", "Got it, reminder dismissed.").close_window(),
        ))
    }
}
