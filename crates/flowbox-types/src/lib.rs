//! Shared domain types for flowbox.
//!
//! This crate contains the core domain types used across the workspace:
//! box and connection definitions, run results, status events, engine
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, uuid, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod run;
pub mod workflow;
