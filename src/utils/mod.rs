//! Utilities
//!
//! Common utilities used throughout the application.

pub mod error;
pub mod text;

pub use error::*;
