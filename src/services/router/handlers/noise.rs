//! Noise filters active inside an open follow-up window.
//!
//! While the window is open the microphone picks up short utterances that
//! are not addressed to the assistant. Known dismissals and bare
//! acknowledgments are dropped without a reply.

use async_trait::async_trait;

use crate::models::{Command, ConversationState, Decision};
use crate::services::router::RouteHandler;
use crate::utils::error::AppResult;
use crate::utils::text::is_one_of;

pub const DISMISSAL_VOCABULARY: &[&str] = &[
    "never mind",
    "nevermind",
    "forget it",
    "nothing",
    "no thanks",
    "no thank you",
    "that's it",
    "i'm good",
    "all good",
    "not now",
];

pub const BARE_ACK_VOCABULARY: &[&str] = &[
    "yeah", "yes", "yep", "yup", "ok", "okay", "hmm", "mm", "mhm", "uh huh", "right", "sure",
    "alright", "cool", "got it",
];

/// Drops known dismissal phrases
pub struct DismissalHandler;

#[async_trait]
impl RouteHandler for DismissalHandler {
    fn name(&self) -> &'static str {
        "dismissal"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        _state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        if command.in_follow_up_window && is_one_of(command.trimmed(), DISMISSAL_VOCABULARY) {
            return Ok(Some(Decision::drop_silently("dismissal")));
        }
        Ok(None)
    }
}

/// Drops bare acknowledgments unless they answer a question
pub struct BareAckHandler;

#[async_trait]
impl RouteHandler for BareAckHandler {
    fn name(&self) -> &'static str {
        "bare_ack"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        if !command.in_follow_up_window || !is_one_of(command.trimmed(), BARE_ACK_VOCABULARY) {
            return Ok(None);
        }
        if state.last_ended_with_question {
            // a real answer to the question just asked
            return Ok(None);
        }
        Ok(Some(Decision::drop_silently("bare_ack")))
    }
}
