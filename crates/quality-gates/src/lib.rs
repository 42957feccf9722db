//! Parley Quality Gates
//!
//! Cheap heuristic checks applied to locally generated text before it is
//! trusted:
//!
//! - `models` - Gate status, failure kinds and per-gate results
//! - `validators` - The individual checks (empty, length, repetition, echo, artifacts)
//! - `pipeline` - Runs the checks in a fixed order and short-circuits on failure

pub mod models;
pub mod pipeline;
pub mod validators;

pub use models::{GateResult, GateStatus, QualityConfig, QualityFailure, QualityVerdict};
pub use pipeline::QualityGatePipeline;
pub use validators::{normalize_for_echo, GateInput};
