//! Task handlers: compound plans, tool selection, legacy skill dispatch and
//! the catch-all model fallback.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{Capability, CapabilityManifest};
use parley_tools::build_tool_list;
use tracing::debug;

use super::defer_bundle;
use crate::config::RouterConfig;
use crate::models::{Command, ConversationState, Decision};
use crate::services::collaborators::{SimilarityScorer, SkillDispatcher};
use crate::services::planner::{PlanOutcome, Planner};
use crate::services::prompts::{ASSISTANT_SYSTEM_PROMPT, TOOL_SYSTEM_PROMPT};
use crate::services::router::RouteHandler;
use crate::utils::error::AppResult;

/// Decomposes multi-step commands; a ready plan goes back to the caller to run
pub struct CompoundTaskHandler {
    planner: Arc<Planner>,
}

impl CompoundTaskHandler {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl RouteHandler for CompoundTaskHandler {
    fn name(&self) -> &'static str {
        "compound_task"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        _state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        if !self.planner.should_decompose(command.trimmed()) {
            return Ok(None);
        }
        match self.planner.plan_command(command.trimmed()).await {
            PlanOutcome::Single => Ok(None),
            PlanOutcome::NeedsConfirmation { question } => {
                Ok(Some(Decision::resolved("plan", question)))
            }
            PlanOutcome::Ready(plan) => Ok(Some(Decision::run_plan("plan", plan))),
        }
    }
}

/// Offers the closest tool-enabled capabilities to the model.
///
/// Declines when a capability that is not tool-enabled scores above every
/// tool-enabled one, leaving the command to skill dispatch.
pub struct ToolSelectionHandler {
    scorer: Option<Arc<dyn SimilarityScorer>>,
    manifest: CapabilityManifest,
    config: RouterConfig,
}

impl ToolSelectionHandler {
    pub fn new(
        scorer: Option<Arc<dyn SimilarityScorer>>,
        manifest: CapabilityManifest,
        config: RouterConfig,
    ) -> Self {
        Self {
            scorer,
            manifest,
            config,
        }
    }

    /// Tool-enabled capabilities to offer, best first; empty to decline
    async fn select(&self, scorer: &dyn SimilarityScorer, text: &str) -> AppResult<Vec<&Capability>> {
        let mut tool_scores: Vec<(&Capability, f32)> = Vec::new();
        let mut best_other: Option<f32> = None;

        for capability in self.manifest.iter().filter(|c| !c.examples.is_empty()) {
            let score = scorer.score(text, &capability.examples).await?;
            if capability.tool_enabled {
                tool_scores.push((capability, score));
            } else {
                best_other = Some(best_other.map_or(score, |b| b.max(score)));
            }
        }

        let best_tool = tool_scores.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
        if tool_scores.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(other) = best_other.filter(|other| *other > best_tool) {
            debug!(best_tool, best_other = other, "non-tool capability outscores tools");
            return Ok(Vec::new());
        }

        tool_scores.retain(|(_, s)| *s >= self.config.tool_score_threshold);
        tool_scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        tool_scores.truncate(self.config.max_tools);
        Ok(tool_scores.into_iter().map(|(c, _)| c).collect())
    }
}

#[async_trait]
impl RouteHandler for ToolSelectionHandler {
    fn name(&self) -> &'static str {
        "tool_selection"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let Some(scorer) = &self.scorer else {
            return Ok(None);
        };
        let selected = self.select(scorer.as_ref(), command.trimmed()).await?;
        if selected.is_empty() {
            return Ok(None);
        }
        debug!(
            tools = ?selected.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "offering tools"
        );
        let tools = build_tool_list(selected);
        let bundle = defer_bundle(TOOL_SYSTEM_PROMPT, command, state, tools);
        Ok(Some(Decision::defer("tool_selection", bundle)))
    }
}

/// Legacy free-text skill dispatch
pub struct SkillDispatchHandler {
    skills: Option<Arc<dyn SkillDispatcher>>,
}

impl SkillDispatchHandler {
    pub fn new(skills: Option<Arc<dyn SkillDispatcher>>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl RouteHandler for SkillDispatchHandler {
    fn name(&self) -> &'static str {
        "skill_dispatch"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        _state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let Some(skills) = &self.skills else {
            return Ok(None);
        };
        Ok(skills
            .execute_capability(command.trimmed())
            .await?
            .filter(|text| !text.trim().is_empty())
            .map(|text| Decision::resolved("skill", text)))
    }
}

/// Always defers to plain chat
pub struct ModelFallbackHandler;

#[async_trait]
impl RouteHandler for ModelFallbackHandler {
    fn name(&self) -> &'static str {
        "model_fallback"
    }

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>> {
        let bundle = defer_bundle(ASSISTANT_SYSTEM_PROMPT, command, state, Vec::new());
        Ok(Some(Decision::defer("model_fallback", bundle)))
    }
}
