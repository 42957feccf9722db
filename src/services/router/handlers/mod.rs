//! Route handlers, grouped by the stage of the chain they belong to.

mod intent;
mod lookup;
mod noise;
mod pending;
mod tasks;

pub use intent::{GeneralIntent, GeneralIntentHandler, IntentClassifier};
pub use lookup::{MemoryHandler, ResearchFollowUpHandler};
pub use noise::{BareAckHandler, DismissalHandler, BARE_ACK_VOCABULARY, DISMISSAL_VOCABULARY};
pub use pending::{
    ForgetConfirmationHandler, PlanControlHandler, ReminderAckHandler, NO_VOCABULARY,
    YES_VOCABULARY,
};
pub use tasks::{
    CompoundTaskHandler, ModelFallbackHandler, SkillDispatchHandler, ToolSelectionHandler,
};

use crate::models::{Command, ConversationState, DeferBundle};
use crate::services::prompts::compose_user_message;
use crate::services::tool_protocol::request_options;
use parley_llm::types::{Message, ToolDefinition};

/// Deferral bundle for the tool protocol client
pub(crate) fn defer_bundle(
    system: &str,
    command: &Command,
    state: &ConversationState,
    tools: Vec<ToolDefinition>,
) -> DeferBundle {
    DeferBundle {
        messages: vec![
            Message::system(system),
            Message::user(compose_user_message(command, state)),
        ],
        tools,
        options: request_options(command.trimmed()),
        command: command.trimmed().to_string(),
    }
}
