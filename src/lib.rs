//! Parley - voice assistant decision core
//!
//! Turns one spoken command into something to say. It includes:
//! - A fixed-order router that resolves, drops or defers each command
//! - A planner for compound commands with confirmation and interrupts
//! - An OpenAI-compatible streaming client with tool calls and a
//!   quality-gated fallback ladder
//! - Configuration, models and utilities

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{AppConfig, FaultPolicy, PlannerConfig, RouterConfig};
pub use models::{Command, ConversationState, Decision, DeferBundle, ResearchResult, SideEffects};
pub use services::{Collaborators, Conversation, Planner, Reply, Router, ToolProtocolClient};
pub use utils::error::{AppError, AppResult};
