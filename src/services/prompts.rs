//! Prompt Templates
//!
//! Every prompt the engine sends to a model lives here.

use crate::models::{Command, ConversationState};

/// Token the decomposer returns when a command needs no plan
pub const SINGLE_STEP_TOKEN: &str = "SINGLE";

/// Longest document excerpt folded into a user message
const MAX_DOCUMENT_CHARS: usize = 4000;

pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a voice assistant. Your replies are \
spoken aloud, so answer in plain conversational sentences without markdown, lists or \
code. Keep answers short unless the user asks for detail.";

pub const TOOL_SYSTEM_PROMPT: &str = "You are a voice assistant with access to tools. \
Call a tool only when it is needed to answer the request; otherwise answer directly. \
Replies are spoken aloud, so use plain sentences without markdown.";

pub const TOOL_SYNTHESIS_INSTRUCTION: &str = "Using the tool result above, answer my \
request in one or two spoken sentences. If the request also needs another tool, call it.";

/// Appended to the system prompt on the nudged local retry
pub const DIRECT_NUDGE: &str = "Be direct. Answer the question in your own words. \
Do not repeat the question, do not emit template tokens, and do not pad the answer.";

/// Fold follow-up context and any attached document into the user message.
///
/// Tool-enabled requests carry no turn history, so context travels as text.
pub fn compose_user_message(command: &Command, state: &ConversationState) -> String {
    let mut message = String::new();

    if command.in_follow_up_window {
        if let Some(previous) = &state.last_response {
            message.push_str(&format!("(You previously said: \"{}\")\n", previous));
        }
    }

    if let Some(document) = &command.document {
        let excerpt: String = document.chars().take(MAX_DOCUMENT_CHARS).collect();
        message.push_str(&format!("Document:\n{}\n\n", excerpt));
    }

    message.push_str(command.trimmed());
    message
}

/// Prompt asking the model to split a compound command into steps
pub fn decomposition_prompt(command: &str, manifest_text: &str, max_steps: usize) -> String {
    format!(
        "Split the user's request into an ordered list of steps, one capability per step.\n\n\
         ## Capabilities\n{manifest_text}\n\n\
         ## Rules\n\
         - Use only the capability names listed above.\n\
         - At most {max_steps} steps, in the order they must run.\n\
         - Each step's \"input\" is a short instruction for that capability.\n\
         - Later steps automatically receive the previous step's result.\n\
         - If the request is really a single action, reply with exactly {SINGLE_STEP_TOKEN}.\n\n\
         ## Output\n\
         Either {SINGLE_STEP_TOKEN}, or a JSON array such as\n\
         [{{\"capability\": \"file_search\", \"input\": \"find my resume\"}}, \
         {{\"capability\": \"email\", \"input\": \"email the file\"}}]\n\
         and nothing else.\n\n\
         ## Request\n{command}"
    )
}

/// Prompt asking the model to merge step outcomes into one spoken answer
pub fn merge_prompt(command: &str, step_report: &str) -> String {
    format!(
        "The user asked: \"{command}\"\n\n\
         The request was carried out as these steps:\n{step_report}\n\n\
         Write one short spoken answer that combines the results. If any step was \
         cancelled, skipped or failed, say so plainly. Do not invent results for \
         those steps."
    )
}
