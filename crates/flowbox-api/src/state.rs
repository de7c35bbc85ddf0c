//! Application state shared by CLI commands and HTTP handlers.

use std::path::PathBuf;
use std::sync::Arc;

use flowbox_core::service::WorkflowService;
use flowbox_types::config::EngineConfig;

/// Shared application state.
///
/// Cloning is cheap; all clones drive the same workflow service.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<WorkflowService>,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Wire the workflow service from an already loaded config.
    pub fn new(config: EngineConfig, data_dir: PathBuf) -> Self {
        let workflow_service = WorkflowService::from_config(&config);
        tracing::debug!(
            step_timeout_secs = config.step_timeout_secs,
            event_capacity = config.event_capacity,
            data_dir = %data_dir.display(),
            "application state initialized"
        );
        Self {
            workflow_service: Arc::new(workflow_service),
            config: Arc::new(config),
            data_dir,
        }
    }
}
