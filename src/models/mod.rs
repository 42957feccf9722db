//! Data Models
//!
//! Types that flow between the router, the planner and the caller.

pub mod command;
pub mod conversation;
pub mod decision;

pub use command::Command;
pub use conversation::{ConversationState, ResearchResult};
pub use decision::{Decision, DeferBundle, SideEffects};
