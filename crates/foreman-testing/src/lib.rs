//! Testing infrastructure for foreman integration tests.
//!
//! This crate provides utilities for writing robust integration tests:
//! - `events`: envelope and event builders with sensible defaults
//! - `plugin`: `NullPlugin`, an agent runtime double that records calls

pub mod events;
pub mod plugin;

pub use plugin::NullPlugin;
