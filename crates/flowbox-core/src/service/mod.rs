//! Services exposed to the presentation layer.
//!
//! Services tie the graph, cache, and orchestrator together behind one
//! facade. They depend only on core types, never on infrastructure crates.

pub mod workflow;

pub use workflow::{WorkflowError, WorkflowService};
