//! Execution outcome types: per-box results, run kinds, and run summaries.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::ValueMap;

/// Outcome of one box execution attempt. Carries no retry state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunResult {
    Success { output: ValueMap },
    Failure { message: String },
}

impl RunResult {
    pub fn failure(message: impl Into<String>) -> Self {
        RunResult::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success { .. })
    }

    /// The failure message, if this is a failure.
    pub fn message(&self) -> Option<&str> {
        match self {
            RunResult::Failure { message } => Some(message),
            RunResult::Success { .. } => None,
        }
    }
}

/// Status reported for a box over the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxStatus {
    Running,
    Success,
    Error,
}

impl fmt::Display for BoxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxStatus::Running => write!(f, "running"),
            BoxStatus::Success => write!(f, "success"),
            BoxStatus::Error => write!(f, "error"),
        }
    }
}

/// Which kind of run was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunKind {
    /// Every box in execution order, starting from a cleared cache.
    Full,
    /// One box against its previously cached inputs.
    Single { box_id: String },
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Full => write!(f, "full"),
            RunKind::Single { box_id } => write!(f, "single({box_id})"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Completed,
    Failed,
}

/// What a finished run reports back to whoever awaited it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: RunKind,
    pub state: RunState,
    /// Box ids that succeeded, in execution order.
    pub succeeded: Vec<String>,
    /// Box ids that failed, in execution order.
    pub failed: Vec<String>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// True when no box failed.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
