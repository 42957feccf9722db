//! Parley Core
//!
//! Foundational types shared by every crate in the Parley workspace. This crate
//! has no dependencies on model providers, HTTP, or the routing engine.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `capability` - Capability descriptors and the manifest consumed by the planner
//! - `streaming` - Unified stream event types and adapter trait

pub mod capability;
pub mod error;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Capabilities ───────────────────────────────────────────────────────
pub use capability::{Capability, CapabilityManifest, RESEARCH_CAPABILITY, SYNTHESIZE_CAPABILITY};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
