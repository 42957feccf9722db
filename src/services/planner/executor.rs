//! Step Execution
//!
//! Runs one plan step against its capability. Later steps get the previous
//! step's result appended as context.

use std::sync::Arc;

use parley_core::{RESEARCH_CAPABILITY, SYNTHESIZE_CAPABILITY};
use parley_llm::provider::LlmProvider;
use parley_llm::types::{LlmRequestOptions, Message, ToolCallMode};
use tracing::debug;

use super::types::Step;
use crate::services::collaborators::{SkillDispatcher, WebResearcher};
use crate::services::prompts::ASSISTANT_SYSTEM_PROMPT;
use crate::utils::error::{AppError, AppResult};

/// Results of a research step read back to the model, at most
const MAX_RESEARCH_RESULTS: usize = 3;

/// Executes steps on behalf of the planner
pub struct StepExecutor {
    model: Arc<dyn LlmProvider>,
    skills: Option<Arc<dyn SkillDispatcher>>,
    research: Option<Arc<dyn WebResearcher>>,
}

impl StepExecutor {
    pub fn new(
        model: Arc<dyn LlmProvider>,
        skills: Option<Arc<dyn SkillDispatcher>>,
        research: Option<Arc<dyn WebResearcher>>,
    ) -> Self {
        Self {
            model,
            skills,
            research,
        }
    }

    /// Run `step`. `Ok(None)` or blank text means the step produced nothing.
    pub async fn execute(&self, step: &Step, previous: Option<&str>) -> AppResult<Option<String>> {
        let input = with_context(&step.input, previous);
        debug!(step = step.index, capability = %step.capability, "executing step");

        match step.capability.as_str() {
            SYNTHESIZE_CAPABILITY => self.ask_model(&input).await,
            RESEARCH_CAPABILITY => match &self.research {
                Some(research) => {
                    let results = research.search(&step.input).await?;
                    Ok(render_research(&results))
                }
                None => self.ask_model(&input).await,
            },
            capability => {
                let skills = self.skills.as_ref().ok_or_else(|| {
                    AppError::collaborator(format!(
                        "no skill dispatcher available for '{}'",
                        capability
                    ))
                })?;
                skills.execute_named(capability, &input).await
            }
        }
    }

    async fn ask_model(&self, input: &str) -> AppResult<Option<String>> {
        let messages = vec![Message::system(ASSISTANT_SYSTEM_PROMPT), Message::user(input)];
        let options = LlmRequestOptions {
            tool_call_mode: ToolCallMode::None,
            ..Default::default()
        };
        let response = self
            .model
            .send_message(messages, None, vec![], options)
            .await?;
        Ok(response.content.filter(|text| !text.trim().is_empty()))
    }
}

fn with_context(input: &str, previous: Option<&str>) -> String {
    match previous {
        Some(previous) => format!("{}\n\nResult of the previous step:\n{}", input, previous),
        None => input.to_string(),
    }
}

fn render_research(results: &[crate::models::ResearchResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .take(MAX_RESEARCH_RESULTS)
            .map(|r| format!("{}: {}", r.title, r.snippet))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
