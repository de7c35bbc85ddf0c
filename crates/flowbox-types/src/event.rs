//! Event types for the flowbox status channel.
//!
//! `WorkflowEvent` is the unified event type broadcast while a run progresses.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::run::{BoxStatus, RunKind, RunState};

/// Events emitted during a workflow run.
///
/// Within one run, every box gets a `BoxStatus { status: running }` followed
/// by exactly one terminal status, and boxes appear in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run has been admitted and its worker started.
    RunStarted {
        run_id: Uuid,
        #[serde(flatten)]
        kind: RunKind,
        box_count: usize,
    },

    /// Status change of a single box.
    BoxStatus {
        run_id: Uuid,
        box_id: String,
        status: BoxStatus,
        /// Output mapping on `success`, `{"message": ...}` on `error`, absent on `running`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    /// A run finished; the orchestrator is idle again.
    RunFinished {
        run_id: Uuid,
        state: RunState,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            WorkflowEvent::RunStarted { run_id, .. }
            | WorkflowEvent::BoxStatus { run_id, .. }
            | WorkflowEvent::RunFinished { run_id, .. } => *run_id,
        }
    }

    /// The box id for box-scoped events, None for run-scoped ones.
    pub fn box_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::BoxStatus { box_id, .. } => Some(box_id),
            WorkflowEvent::RunStarted { .. } | WorkflowEvent::RunFinished { .. } => None,
        }
    }

    /// The box status for box-scoped events.
    pub fn box_status(&self) -> Option<BoxStatus> {
        match self {
            WorkflowEvent::BoxStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn box_status_running_omits_data() {
        let event = WorkflowEvent::BoxStatus {
            run_id: Uuid::now_v7(),
            box_id: "gen".to_string(),
            status: BoxStatus::Running,
            data: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"box_status\""));
        assert!(json.contains("\"status\":\"running\""));
        assert!(!json.contains("data"));
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn box_status_error_carries_message() {
        let event = WorkflowEvent::BoxStatus {
            run_id: Uuid::now_v7(),
            box_id: "add".to_string(),
            status: BoxStatus::Error,
            data: Some(json!({"message": "missing upstream output from gen"})),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["message"], json!("missing upstream output from gen"));
        assert_eq!(event.box_id(), Some("add"));
        assert_eq!(event.box_status(), Some(BoxStatus::Error));
    }

    #[test]
    fn run_started_flattens_kind() {
        let event = WorkflowEvent::RunStarted {
            run_id: Uuid::now_v7(),
            kind: RunKind::Single {
                box_id: "add".to_string(),
            },
            box_count: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"run_started\""));
        assert!(json.contains("\"kind\":\"single\""));
        assert!(json.contains("\"box_id\":\"add\""));
        assert!(event.box_id().is_none());
    }

    #[test]
    fn run_finished_roundtrip() {
        let event = WorkflowEvent::RunFinished {
            run_id: Uuid::now_v7(),
            state: RunState::Completed,
            succeeded: 2,
            failed: 1,
            duration_ms: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, WorkflowEvent::RunFinished { failed: 1, .. }));
    }
}
