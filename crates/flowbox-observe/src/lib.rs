//! Observability setup for flowbox: tracing subscriber and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
