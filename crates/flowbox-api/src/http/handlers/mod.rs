//! Request handlers, one module per resource.

pub mod workflow;
pub mod ws;
