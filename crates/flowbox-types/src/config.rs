//! Engine configuration types for flowbox.
//!
//! `EngineConfig` represents the `config.toml` that controls box timeouts,
//! status channel capacity, and log output format.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
///
/// Loaded from `~/.flowbox/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock limit for a single box body, in seconds.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Capacity of the status broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Log line format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_step_timeout_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            event_capacity: default_event_capacity(),
            log_format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
