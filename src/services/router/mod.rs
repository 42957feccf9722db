//! Router
//!
//! Runs a command through a fixed chain of handlers. Each handler either
//! returns a terminal `Decision` or declines, and the first decision wins.
//! The order is part of the contract and is pinned by `HANDLER_ORDER`.

pub mod handlers;

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::CapabilityManifest;
use tracing::{debug, warn};

use crate::config::{FaultPolicy, RouterConfig};
use crate::models::{Command, ConversationState, Decision};
use crate::services::collaborators::Collaborators;
use crate::services::planner::Planner;
use crate::utils::error::{AppError, AppResult};

use handlers::{
    BareAckHandler, CompoundTaskHandler, DismissalHandler, ForgetConfirmationHandler,
    GeneralIntentHandler, MemoryHandler, ModelFallbackHandler, PlanControlHandler,
    ReminderAckHandler, ResearchFollowUpHandler, SkillDispatchHandler, ToolSelectionHandler,
};

/// Handler names in the order they are consulted
pub const HANDLER_ORDER: [&str; 12] = [
    "plan_control",
    "forget_confirmation",
    "reminder_ack",
    "general_intent",
    "dismissal",
    "bare_ack",
    "memory",
    "research_followup",
    "compound_task",
    "tool_selection",
    "skill_dispatch",
    "model_fallback",
];

/// One link of the routing chain.
///
/// Returning `Ok(None)` declines. A declining handler must leave `state`
/// untouched.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_resolve(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Option<Decision>>;
}

/// Fixed-order handler chain
pub struct Router {
    handlers: Vec<Box<dyn RouteHandler>>,
    fault_policy: FaultPolicy,
}

impl Router {
    /// Build the standard chain.
    pub fn new(
        config: &RouterConfig,
        manifest: CapabilityManifest,
        planner: Arc<Planner>,
        collaborators: &Collaborators,
    ) -> Self {
        let handlers: Vec<Box<dyn RouteHandler>> = vec![
            Box::new(PlanControlHandler::new(planner.clone())),
            Box::new(ForgetConfirmationHandler::new(collaborators.memory.clone())),
            Box::new(ReminderAckHandler::new(collaborators.reminders.clone())),
            Box::new(GeneralIntentHandler::new()),
            Box::new(DismissalHandler),
            Box::new(BareAckHandler),
            Box::new(MemoryHandler::new(collaborators.memory.clone())),
            Box::new(ResearchFollowUpHandler),
            Box::new(CompoundTaskHandler::new(planner)),
            Box::new(ToolSelectionHandler::new(
                collaborators.scorer.clone(),
                manifest,
                config.clone(),
            )),
            Box::new(SkillDispatchHandler::new(collaborators.skills.clone())),
            Box::new(ModelFallbackHandler),
        ];
        Self::with_handlers(handlers, config.fault_policy)
    }

    /// Build a router over an explicit chain
    pub fn with_handlers(handlers: Vec<Box<dyn RouteHandler>>, fault_policy: FaultPolicy) -> Self {
        Self {
            handlers,
            fault_policy,
        }
    }

    /// Handler names in chain order
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    /// Route one command to a decision.
    ///
    /// Under the lenient policy a handler error counts as a decline; under
    /// the strict policy it is returned.
    pub async fn route(
        &self,
        command: &Command,
        state: &mut ConversationState,
    ) -> AppResult<Decision> {
        for handler in &self.handlers {
            match handler.try_resolve(command, state).await {
                Ok(Some(decision)) => {
                    debug!(handler = handler.name(), source = %decision.source, "command resolved");
                    return Ok(decision);
                }
                Ok(None) => {}
                Err(e) => match self.fault_policy {
                    FaultPolicy::Lenient => {
                        warn!(handler = handler.name(), error = %e, "handler fault; continuing");
                    }
                    FaultPolicy::Strict => return Err(e),
                },
            }
        }
        Err(AppError::internal("no handler resolved the command"))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("handlers", &self.handler_names())
            .field("fault_policy", &self.fault_policy)
            .finish()
    }
}
