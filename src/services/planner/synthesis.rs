//! Plan Synthesis
//!
//! Turns a finished plan into one spoken answer.

use parley_llm::provider::LlmProvider;
use parley_llm::types::{LlmRequestOptions, Message, ToolCallMode};
use tracing::warn;

use super::types::{Plan, PlanStatus, StepStatus};
use crate::services::prompts::{merge_prompt, ASSISTANT_SYSTEM_PROMPT};

/// One line per step: position, status, capability, input and outcome
pub fn step_report(plan: &Plan) -> String {
    plan.steps
        .iter()
        .map(|step| {
            let outcome = match (&step.result, &step.error) {
                (Some(result), _) => format!(" -> {}", result),
                (None, Some(error)) => format!(" -> error: {}", error),
                (None, None) => String::new(),
            };
            format!(
                "{}. [{}] {}: {}{}",
                step.index + 1,
                step.status,
                step.capability,
                step.input,
                outcome
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Spoken text when no step completed
fn nothing_completed(plan: &Plan) -> String {
    if plan.status == PlanStatus::Cancelled {
        return "Okay, I stopped before finishing any of that.".to_string();
    }
    match plan.steps.iter().find_map(|s| s.error.as_deref()) {
        Some(error) => format!("Sorry, I couldn't get that done. The first step failed: {}.", error),
        None => "Sorry, I couldn't get any part of that done.".to_string(),
    }
}

/// Produce the final answer for a finished plan.
///
/// A lone completed step with nothing failed or cancelled is returned as is.
/// Otherwise one model call merges the outcomes; if that fails the completed
/// results are joined.
pub async fn synthesize(model: &dyn LlmProvider, plan: &Plan) -> String {
    let completed: Vec<&str> = plan
        .completed_steps()
        .filter_map(|s| s.result.as_deref())
        .collect();

    if completed.is_empty() {
        return nothing_completed(plan);
    }

    let clean = plan.status == PlanStatus::Completed && plan.count(StepStatus::Failed) == 0;
    if completed.len() == 1 && clean {
        return completed[0].to_string();
    }

    let messages = vec![
        Message::system(ASSISTANT_SYSTEM_PROMPT),
        Message::user(merge_prompt(&plan.command, &step_report(plan))),
    ];
    let options = LlmRequestOptions {
        tool_call_mode: ToolCallMode::None,
        ..Default::default()
    };
    match model.send_message(messages, None, vec![], options).await {
        Ok(response) if !response.text_or_empty().trim().is_empty() => {
            response.text_or_empty().trim().to_string()
        }
        Ok(_) => {
            warn!(plan_id = %plan.id, "merge reply was empty; joining step results");
            concatenate(plan, &completed)
        }
        Err(e) => {
            warn!(plan_id = %plan.id, error = %e, "merge call failed; joining step results");
            concatenate(plan, &completed)
        }
    }
}

fn concatenate(plan: &Plan, completed: &[&str]) -> String {
    let mut text = completed.join(" ");
    let unfinished = plan.count(StepStatus::Failed) + plan.count(StepStatus::Skipped);
    if unfinished > 0 {
        text.push_str(&format!(
            " I didn't finish {} of the {} steps.",
            unfinished,
            plan.steps.len()
        ));
    }
    text
}
