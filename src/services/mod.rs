//! Services
//!
//! The decision engine: routing, planning, the model client and the
//! conversation facade that ties them together.

pub mod collaborators;
pub mod conversation;
pub mod planner;
pub mod prompts;
pub mod router;
pub mod tool_protocol;

pub use collaborators::{
    Collaborators, MemoryStore, PendingReminder, ReminderNotifier, SimilarityScorer,
    SkillDispatcher, WebResearcher,
};
pub use conversation::{Conversation, Reply, MAX_TOOL_ROUNDS};
pub use planner::{Confirmation, Plan, PlanOutcome, PlanReport, PlanStatus, Planner, Step, StepStatus};
pub use router::{RouteHandler, Router, HANDLER_ORDER};
pub use tool_protocol::{ChatOutcome, StreamItem, ToolProtocolClient};
