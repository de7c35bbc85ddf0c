//! Workflow engine core: graph model, result cache, and box execution.
//!
//! - `graph` -- graph builder, validation, declaration-ordered topological sort
//! - `cache` -- per-box last successful output and the inputs that produced it
//! - `engine` -- the `BoxEngine` seam and the JEXL-backed default engine
//! - `executor` -- runs one box body and normalizes the outcome into a `RunResult`
//! - `orchestrator` -- full and single-box runs, one at a time, with status events

pub mod cache;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod orchestrator;
