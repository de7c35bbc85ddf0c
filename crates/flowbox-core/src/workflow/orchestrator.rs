//! Run orchestrator: full and single-box runs, one at a time.
//!
//! A run moves `Idle -> Running -> {Completed, Failed}` and back to idle.
//! Admission is a compare-and-swap on an `AtomicBool` taken synchronously by
//! the requester; the returned `RunGuard` releases it on drop, including
//! when the worker task panics.
//!
//! Boxes run strictly one after another. Every box gets a `running` event
//! followed by exactly one terminal event, published from the worker in
//! execution order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use flowbox_types::error::RunError;
use flowbox_types::event::WorkflowEvent;
use flowbox_types::run::{BoxStatus, RunKind, RunResult, RunState, RunSummary};
use flowbox_types::workflow::ValueMap;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::cache::ResultCache;
use super::executor::StepExecutor;
use super::graph::WorkflowGraph;
use crate::event::EventBus;

/// Failure message for a single-box run with nothing cached.
pub const NO_CACHED_INPUTS: &str = "no cached inputs; run full workflow first";

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Proof that the holder owns the single run slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// RunOrchestrator
// ---------------------------------------------------------------------------

/// Sequences box executions, owns the cache writes, and emits status events.
///
/// Cloning shares the cache, the event bus, and the run slot.
#[derive(Debug, Clone)]
pub struct RunOrchestrator {
    cache: ResultCache,
    executor: StepExecutor,
    bus: EventBus,
    running: Arc<AtomicBool>,
}

impl RunOrchestrator {
    pub fn new(cache: ResultCache, executor: StepExecutor, bus: EventBus) -> Self {
        Self {
            cache,
            executor,
            bus,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the run slot, or fail if a run is already in progress.
    pub fn try_admit(&self) -> Result<RunGuard, RunError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RunError::RunAlreadyInProgress)?;
        Ok(RunGuard {
            flag: Arc::clone(&self.running),
        })
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Admit a full run now and execute it on a spawned task.
    pub fn request_run_all(
        &self,
        graph: Arc<WorkflowGraph>,
    ) -> Result<JoinHandle<RunSummary>, RunError> {
        let guard = self.try_admit()?;
        Ok(self.spawn_all(guard, graph))
    }

    /// Admit a single-box run now and execute it on a spawned task.
    pub fn request_run_single(
        &self,
        graph: Arc<WorkflowGraph>,
        box_id: &str,
    ) -> Result<JoinHandle<RunSummary>, RunError> {
        graph.node_data(box_id)?;
        let guard = self.try_admit()?;
        self.spawn_single(guard, graph, box_id)
    }

    /// Execute a full run on a spawned task under an already claimed slot.
    ///
    /// Callers that look the graph up after admitting pass the guard here, so
    /// the graph cannot be swapped between admission and execution.
    pub fn spawn_all(
        &self,
        guard: RunGuard,
        graph: Arc<WorkflowGraph>,
    ) -> JoinHandle<RunSummary> {
        let this = self.clone();
        tokio::spawn(async move {
            let summary = this.execute_all(&graph).await;
            drop(guard);
            summary
        })
    }

    /// Execute a single-box run on a spawned task under an already claimed
    /// slot. An unknown box releases the slot and is rejected.
    pub fn spawn_single(
        &self,
        guard: RunGuard,
        graph: Arc<WorkflowGraph>,
        box_id: &str,
    ) -> Result<JoinHandle<RunSummary>, RunError> {
        graph.node_data(box_id)?;
        let this = self.clone();
        let box_id = box_id.to_string();
        Ok(tokio::spawn(async move {
            let summary = this.execute_single(&graph, &box_id).await;
            drop(guard);
            summary
        }))
    }

    /// Run every box in execution order on the current task.
    pub async fn run_all(&self, graph: &WorkflowGraph) -> Result<RunSummary, RunError> {
        let _guard = self.try_admit()?;
        Ok(self.execute_all(graph).await)
    }

    /// Re-run one box against its cached inputs on the current task.
    pub async fn run_single(
        &self,
        graph: &WorkflowGraph,
        box_id: &str,
    ) -> Result<RunSummary, RunError> {
        graph.node_data(box_id)?;
        let _guard = self.try_admit()?;
        Ok(self.execute_single(graph, box_id).await)
    }

    // -----------------------------------------------------------------------
    // Run bodies (caller holds the guard)
    // -----------------------------------------------------------------------

    async fn execute_all(&self, graph: &WorkflowGraph) -> RunSummary {
        let mut run = RunTracker::start(RunKind::Full);
        tracing::info!(
            run_id = %run.run_id,
            boxes = graph.len(),
            subscribers = self.bus.subscriber_count(),
            "full run started"
        );
        self.publish_started(&run, graph.len());

        self.cache.clear_all();

        for box_id in graph.execution_order() {
            let Ok(node) = graph.node_data(&box_id) else {
                continue;
            };

            for input in graph.unbound_inputs(&box_id) {
                tracing::warn!(box_id = %box_id, input, "declared input has no incoming connection");
            }

            self.emit(run.run_id, &box_id, BoxStatus::Running, None);

            let result = match self.gather_inputs(graph, &box_id) {
                Ok(inputs) => {
                    let result = self.executor.run(&box_id, &node.code, &inputs).await;
                    (result, inputs)
                }
                Err(source) => {
                    tracing::warn!(box_id = %box_id, source, "upstream output missing, skipping box");
                    (
                        RunResult::failure(format!("missing upstream output from {source}")),
                        ValueMap::new(),
                    )
                }
            };

            self.record(&mut run, &box_id, result);
        }

        self.finish(run, RunState::Completed)
    }

    async fn execute_single(&self, graph: &WorkflowGraph, box_id: &str) -> RunSummary {
        let mut run = RunTracker::start(RunKind::Single {
            box_id: box_id.to_string(),
        });
        tracing::info!(
            run_id = %run.run_id,
            box_id,
            subscribers = self.bus.subscriber_count(),
            "single-box run started"
        );
        self.publish_started(&run, 1);

        self.emit(run.run_id, box_id, BoxStatus::Running, None);

        let Some(inputs) = self.cache.get_inputs_used(box_id) else {
            tracing::warn!(box_id, "no cached inputs for single-box run");
            self.emit(
                run.run_id,
                box_id,
                BoxStatus::Error,
                Some(json!({ "message": NO_CACHED_INPUTS })),
            );
            run.failed.push(box_id.to_string());
            return self.finish(run, RunState::Failed);
        };

        let result = match graph.node_data(box_id) {
            Ok(node) => self.executor.run(box_id, &node.code, &inputs).await,
            Err(e) => RunResult::failure(e.to_string()),
        };
        let state = if result.is_success() {
            RunState::Completed
        } else {
            RunState::Failed
        };

        self.record(&mut run, box_id, (result, inputs));
        self.finish(run, state)
    }

    /// Resolve a box's inputs from its upstream outputs.
    ///
    /// Each upstream box's whole output mapping becomes the value of the bound
    /// input. Returns the first source with nothing cached.
    fn gather_inputs<'g>(
        &self,
        graph: &'g WorkflowGraph,
        box_id: &str,
    ) -> Result<ValueMap, &'g str> {
        let mut inputs = ValueMap::new();
        for (source, input) in graph.upstream_of(box_id) {
            let output = self.cache.get_output(source).ok_or(source)?;
            inputs.insert(input.to_string(), Value::Object(output));
        }
        Ok(inputs)
    }

    /// Apply a box result to the cache and emit its terminal status.
    fn record(&self, run: &mut RunTracker, box_id: &str, (result, inputs): (RunResult, ValueMap)) {
        match result {
            RunResult::Success { output } => {
                self.cache.put(box_id, &output, &inputs);
                self.emit(
                    run.run_id,
                    box_id,
                    BoxStatus::Success,
                    Some(Value::Object(output)),
                );
                run.succeeded.push(box_id.to_string());
            }
            RunResult::Failure { message } => {
                self.cache.clear_one(box_id);
                self.emit(
                    run.run_id,
                    box_id,
                    BoxStatus::Error,
                    Some(json!({ "message": message })),
                );
                run.failed.push(box_id.to_string());
            }
        }
    }

    fn emit(&self, run_id: Uuid, box_id: &str, status: BoxStatus, data: Option<Value>) {
        self.bus.publish(WorkflowEvent::BoxStatus {
            run_id,
            box_id: box_id.to_string(),
            status,
            data,
        });
    }

    fn publish_started(&self, run: &RunTracker, box_count: usize) {
        self.bus.publish(WorkflowEvent::RunStarted {
            run_id: run.run_id,
            kind: run.kind.clone(),
            box_count,
        });
    }

    fn finish(&self, run: RunTracker, state: RunState) -> RunSummary {
        let summary = run.into_summary(state);
        tracing::info!(
            run_id = %summary.run_id,
            kind = %summary.kind,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            duration_ms = summary.duration_ms,
            "run finished"
        );
        self.bus.publish(WorkflowEvent::RunFinished {
            run_id: summary.run_id,
            state: summary.state,
            succeeded: summary.succeeded.len(),
            failed: summary.failed.len(),
            duration_ms: summary.duration_ms,
        });
        summary
    }
}

/// Bookkeeping for the run in flight.
struct RunTracker {
    run_id: Uuid,
    kind: RunKind,
    started: Instant,
    succeeded: Vec<String>,
    failed: Vec<String>,
}

impl RunTracker {
    fn start(kind: RunKind) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            kind,
            started: Instant::now(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn into_summary(self, state: RunState) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            kind: self.kind,
            state,
            succeeded: self.succeeded,
            failed: self.failed,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
