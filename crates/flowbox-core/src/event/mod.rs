//! Status channel for workflow runs.
//!
//! Provides an `EventBus` that pushes `WorkflowEvent` messages to every
//! subscriber via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
