//! Infrastructure layer for flowbox.
//!
//! Filesystem-facing adapters: the engine config loader, data directory
//! resolution, and the workflow description file reader.

pub mod config;
pub mod workflow_file;
