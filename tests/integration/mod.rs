//! Integration Tests Module
//!
//! Drives the public API with a scripted model provider and in-memory
//! collaborators. Tests cover the planner, the routing chain and full
//! conversation turns including tool calls and the fallback ladder.

// Scripted provider and collaborator doubles
mod support;

// Planning, confirmation and interrupt tests
mod planner_test;

// Handler chain tests
mod router_test;

// End-to-end conversation tests
mod conversation_test;
