//! Workflow graph engine for flowbox.
//!
//! This crate holds everything with real invariants: graph validation and
//! ordering, the result cache, the box execution boundary, and the run
//! orchestrator. It depends only on `flowbox-types` -- never on
//! `flowbox-infra` or any filesystem/network crate.

pub mod event;
pub mod service;
pub mod workflow;
