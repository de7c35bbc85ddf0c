//! Workflow service: load a description, trigger runs, peek at results.
//!
//! Holds at most one loaded graph. Loading replaces it atomically and
//! clears the cache; a failed load leaves the previous graph in place.

use std::sync::Arc;

use flowbox_types::config::EngineConfig;
use flowbox_types::error::{RunError, ValidationError};
use flowbox_types::event::WorkflowEvent;
use flowbox_types::run::RunSummary;
use flowbox_types::workflow::{Layout, ParsedWorkflow, ValueMap, WorkflowView};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

use crate::event::EventBus;
use crate::workflow::cache::{CacheEntry, ResultCache};
use crate::workflow::engine::{BoxEngine, JexlEngine};
use crate::workflow::executor::StepExecutor;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::orchestrator::RunOrchestrator;

/// Errors surfaced by the workflow service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "VALIDATION_ERROR",
            WorkflowError::Run(e) => e.code(),
        }
    }
}

/// Facade over the graph, cache, orchestrator, and status channel.
pub struct WorkflowService {
    orchestrator: RunOrchestrator,
    graph: RwLock<Option<Arc<WorkflowGraph>>>,
    layout: RwLock<Layout>,
}

impl WorkflowService {
    pub fn new(orchestrator: RunOrchestrator) -> Self {
        Self {
            orchestrator,
            graph: RwLock::new(None),
            layout: RwLock::new(Layout::new()),
        }
    }

    /// Build a service around the given engine using `config` limits.
    pub fn with_engine(engine: Arc<dyn BoxEngine>, config: &EngineConfig) -> Self {
        let executor = StepExecutor::new(engine, config.step_timeout());
        let bus = EventBus::new(config.event_capacity);
        Self::new(RunOrchestrator::new(ResultCache::new(), executor, bus))
    }

    /// Build a service with the default JEXL engine.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_engine(Arc::new(JexlEngine::new()), config)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Validate and install a parsed workflow, returning its render-ready view.
    ///
    /// Rejected while a run is in progress. On success the cache is cleared
    /// and the layout replaced; on failure nothing changes.
    pub async fn load_workflow(&self, parsed: ParsedWorkflow) -> Result<WorkflowView, WorkflowError> {
        let _guard = self.orchestrator.try_admit()?;

        let ParsedWorkflow {
            boxes,
            connections,
            layout,
        } = parsed;

        let graph = WorkflowGraph::build(boxes, connections).inspect_err(|e| {
            tracing::warn!(code = e.code(), error = %e, "workflow rejected");
        })?;
        let view = graph.view(layout.clone());

        self.orchestrator.cache().clear_all();
        *self.graph.write().await = Some(Arc::new(graph));
        *self.layout.write().await = layout;

        tracing::info!(
            boxes = view.nodes.len(),
            connections = view.edges.len(),
            "workflow loaded"
        );
        Ok(view)
    }

    /// The currently loaded graph, if any.
    pub async fn graph(&self) -> Option<Arc<WorkflowGraph>> {
        self.graph.read().await.clone()
    }

    /// Render-ready view of the loaded workflow with the current layout.
    pub async fn view(&self) -> Option<WorkflowView> {
        let graph = self.graph().await?;
        let layout = self.layout.read().await.clone();
        Some(graph.view(layout))
    }

    pub async fn execution_order(&self) -> Result<Vec<String>, RunError> {
        Ok(self.loaded_graph().await?.execution_order())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Start a full run. Events arrive on `subscribe()`.
    ///
    /// The run slot is claimed before the graph is read, so a concurrent
    /// `load_workflow` either finishes first or is rejected.
    pub async fn request_run_all(&self) -> Result<JoinHandle<RunSummary>, RunError> {
        let guard = self.orchestrator.try_admit()?;
        let graph = self.loaded_graph().await?;
        Ok(self.orchestrator.spawn_all(guard, graph))
    }

    /// Start a single-box rerun against that box's cached inputs.
    pub async fn request_run_single(
        &self,
        box_id: &str,
    ) -> Result<JoinHandle<RunSummary>, RunError> {
        let guard = self.orchestrator.try_admit()?;
        let graph = self.loaded_graph().await?;
        self.orchestrator.spawn_single(guard, graph, box_id)
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.orchestrator.bus().subscribe()
    }

    // -----------------------------------------------------------------------
    // Cache and layout
    // -----------------------------------------------------------------------

    /// Copy of a box's last successful output.
    pub fn get_cached_output(&self, box_id: &str) -> Option<ValueMap> {
        self.orchestrator.cache().get_output(box_id)
    }

    pub fn get_cache_entry(&self, box_id: &str) -> Option<CacheEntry> {
        self.orchestrator.cache().get_entry(box_id)
    }

    pub fn cached_box_ids(&self) -> Vec<String> {
        self.orchestrator.cache().keys()
    }

    pub async fn layout(&self) -> Layout {
        self.layout.read().await.clone()
    }

    /// Replace the stored layout. Entries are kept as given, even for ids the
    /// graph does not know.
    pub async fn update_layout(&self, layout: Layout) {
        *self.layout.write().await = layout;
    }

    async fn loaded_graph(&self) -> Result<Arc<WorkflowGraph>, RunError> {
        self.graph().await.ok_or(RunError::NoWorkflowLoaded)
    }
}

impl std::fmt::Debug for WorkflowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowService")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::workflow::engine::EngineError;
    use flowbox_types::run::{BoxStatus, RunState};
    use flowbox_types::workflow::{BoxDefinition, ConnectionDefinition, LayoutPosition};
    use serde_json::{Value, json};

    fn service() -> WorkflowService {
        WorkflowService::from_config(&EngineConfig::default())
    }

    fn a_to_b() -> ParsedWorkflow {
        ParsedWorkflow {
            boxes: vec![
                BoxDefinition::new("A", &[], r#"{"x": 1}"#),
                BoxDefinition::new("B", &["nums"], r#"{"y": nums.x + 1}"#),
            ],
            connections: vec![ConnectionDefinition::new("A", "B", "nums")],
            layout: Layout::new(),
        }
    }

    fn cyclic() -> ParsedWorkflow {
        ParsedWorkflow {
            boxes: vec![
                BoxDefinition::new("p", &["v"], "{}"),
                BoxDefinition::new("q", &["v"], "{}"),
            ],
            connections: vec![
                ConnectionDefinition::new("p", "q", "v"),
                ConnectionDefinition::new("q", "p", "v"),
            ],
            layout: Layout::new(),
        }
    }

    fn single(id: &str) -> ParsedWorkflow {
        ParsedWorkflow {
            boxes: vec![BoxDefinition::new(id, &[], r#"{"v": 1}"#)],
            connections: vec![],
            layout: Layout::new(),
        }
    }

    struct SlowEngine;

    impl BoxEngine for SlowEngine {
        fn invoke(&self, _code: &str, _inputs: &ValueMap) -> Result<Value, EngineError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn load_returns_view() {
        let svc = service();
        let view = svc.load_workflow(a_to_b()).await.unwrap();

        assert_eq!(view.nodes.len(), 2);
        assert_eq!(view.edges.len(), 1);
        assert_eq!(
            view.nodes[1].input_sources.get("nums").map(String::as_str),
            Some("A")
        );
        assert_eq!(svc.execution_order().await.unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn run_all_then_peek_cache() {
        let svc = service();
        svc.load_workflow(a_to_b()).await.unwrap();
        let mut rx = svc.subscribe();

        let summary = svc.request_run_all().await.unwrap().await.unwrap();

        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(
            svc.get_cached_output("B").map(Value::Object),
            Some(json!({"y": 2}))
        );
        assert_eq!(svc.cached_box_ids(), vec!["A", "B"]);

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Some(status) = event.box_status() {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                BoxStatus::Running,
                BoxStatus::Success,
                BoxStatus::Running,
                BoxStatus::Success
            ]
        );
    }

    #[tokio::test]
    async fn load_clears_cache() {
        let svc = service();
        svc.load_workflow(a_to_b()).await.unwrap();
        svc.request_run_all().await.unwrap().await.unwrap();
        assert!(svc.get_cached_output("A").is_some());

        svc.load_workflow(a_to_b()).await.unwrap();

        assert!(svc.get_cached_output("A").is_none());
        assert!(svc.get_cached_output("B").is_none());
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_workflow() {
        let svc = service();
        svc.load_workflow(a_to_b()).await.unwrap();
        svc.request_run_all().await.unwrap().await.unwrap();

        let err = svc.load_workflow(cyclic()).await.unwrap_err();

        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::CycleDetected(_))
        ));
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(svc.execution_order().await.unwrap(), vec!["A", "B"]);
        assert!(svc.get_cached_output("B").is_some());
    }

    #[tokio::test]
    async fn duplicate_binding_rejected_at_load() {
        let svc = service();
        let parsed = ParsedWorkflow {
            boxes: vec![
                BoxDefinition::new("a", &[], "{}"),
                BoxDefinition::new("b", &[], "{}"),
                BoxDefinition::new("t", &["x"], "{}"),
            ],
            connections: vec![
                ConnectionDefinition::new("a", "t", "x"),
                ConnectionDefinition::new("b", "t", "x"),
            ],
            layout: Layout::new(),
        };

        let err = svc.load_workflow(parsed).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::DuplicateInputBinding { .. })
        ));
        assert!(svc.graph().await.is_none());
    }

    #[tokio::test]
    async fn runs_require_a_workflow() {
        let svc = service();
        assert_eq!(
            svc.request_run_all().await.unwrap_err(),
            RunError::NoWorkflowLoaded
        );
        assert_eq!(
            svc.request_run_single("A").await.unwrap_err(),
            RunError::NoWorkflowLoaded
        );
        assert!(svc.view().await.is_none());
    }

    #[tokio::test]
    async fn unknown_box_single_run_rejected() {
        let svc = service();
        svc.load_workflow(a_to_b()).await.unwrap();
        assert_eq!(
            svc.request_run_single("zzz").await.unwrap_err(),
            RunError::UnknownBox("zzz".to_string())
        );
    }

    #[tokio::test]
    async fn load_rejected_while_running() {
        let svc = WorkflowService::with_engine(Arc::new(SlowEngine), &EngineConfig::default());
        svc.load_workflow(a_to_b()).await.unwrap();

        let handle = svc.request_run_all().await.unwrap();
        let err = svc.load_workflow(a_to_b()).await.unwrap_err();
        assert_eq!(err, WorkflowError::Run(RunError::RunAlreadyInProgress));
        assert_eq!(err.code(), "RUN_IN_PROGRESS");

        handle.await.unwrap();
        assert!(!svc.is_running());
        assert!(svc.load_workflow(a_to_b()).await.is_ok());
    }

    #[tokio::test]
    async fn load_cannot_swap_graph_under_admitted_run() {
        let svc = service();
        svc.load_workflow(single("old")).await.unwrap();

        // Slot claimed, graph not read yet
        let guard = svc.orchestrator.try_admit().unwrap();
        assert_eq!(
            svc.load_workflow(single("new")).await.unwrap_err(),
            WorkflowError::Run(RunError::RunAlreadyInProgress)
        );
        let graph = svc.loaded_graph().await.unwrap();
        svc.orchestrator.spawn_all(guard, graph).await.unwrap();
        assert_eq!(svc.cached_box_ids(), vec!["old"]);

        svc.load_workflow(single("new")).await.unwrap();
        svc.request_run_all().await.unwrap().await.unwrap();

        assert!(svc.get_cached_output("old").is_none());
        assert_eq!(svc.cached_box_ids(), vec!["new"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_and_runs_never_leak_old_outputs() {
        let svc = Arc::new(service());
        svc.load_workflow(single("w0")).await.unwrap();

        for i in 1..200 {
            let loader = {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.load_workflow(single(&format!("w{i}"))).await })
            };
            let runner = {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move {
                    if let Ok(handle) = svc.request_run_all().await {
                        handle.await.unwrap();
                    }
                })
            };
            let _ = loader.await.unwrap();
            runner.await.unwrap();

            let loaded = svc.execution_order().await.unwrap();
            for key in svc.cached_box_ids() {
                assert!(loaded.contains(&key), "stale output {key} cached, loaded {loaded:?}");
            }
        }
    }

    #[tokio::test]
    async fn layout_round_trips_opaquely() {
        let svc = service();
        let mut parsed = a_to_b();
        parsed
            .layout
            .insert("A".to_string(), LayoutPosition { x: 1.0, y: 2.0 });
        let view = svc.load_workflow(parsed).await.unwrap();
        assert_eq!(view.layout.len(), 1);

        let mut layout = Layout::new();
        layout.insert("B".to_string(), LayoutPosition { x: 5.5, y: -3.0 });
        layout.insert("not-a-box".to_string(), LayoutPosition { x: 0.0, y: 0.0 });
        svc.update_layout(layout.clone()).await;

        assert_eq!(svc.layout().await, layout);
        assert_eq!(svc.view().await.unwrap().layout, layout);
    }
}
