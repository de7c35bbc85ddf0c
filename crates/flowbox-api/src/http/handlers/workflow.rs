//! Workflow load, run, and cache handlers for the HTTP API.
//!
//! Runs are fire-and-forget by default: the handler returns `202 Accepted`
//! once the run is admitted and progress streams over `/ws/status`. Pass
//! `?wait=true` to block until the run finishes and receive its summary.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use flowbox_core::workflow::cache::CacheEntry;
use flowbox_types::error::RunError;
use flowbox_types::run::RunSummary;
use flowbox_types::workflow::{Layout, ParsedWorkflow, WorkflowView};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for run triggers.
#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    /// Wait for the run to finish and return its summary.
    #[serde(default)]
    pub wait: bool,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// POST /api/v1/workflow - Validate and install a parsed workflow.
pub async fn load_workflow(
    State(state): State<AppState>,
    Json(body): Json<ParsedWorkflow>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let view = state.workflow_service.load_workflow(body).await?;
    Ok(Json(ApiResponse::timed(view, start)))
}

/// GET /api/v1/workflow - Current view with the stored layout.
pub async fn get_workflow(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let view = state
        .workflow_service
        .view()
        .await
        .ok_or(RunError::NoWorkflowLoaded)?;
    Ok(Json(ApiResponse::timed(view, start)))
}

/// GET /api/v1/workflow/order - Box ids in execution order.
pub async fn get_order(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let start = Instant::now();
    let order = state.workflow_service.execution_order().await?;
    Ok(Json(ApiResponse::timed(order, start)))
}

/// PUT /api/v1/workflow/layout - Replace the stored canvas layout.
pub async fn update_layout(
    State(state): State<AppState>,
    Json(layout): Json<Layout>,
) -> Json<ApiResponse<Layout>> {
    let start = Instant::now();
    state.workflow_service.update_layout(layout).await;
    let stored = state.workflow_service.layout().await;
    Json(ApiResponse::timed(stored, start))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// POST /api/v1/runs - Run every box.
pub async fn run_all(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), AppError> {
    let start = Instant::now();
    let handle = state.workflow_service.request_run_all().await?;
    tracing::info!("full run requested over HTTP");
    respond_to_run(handle, query.wait, json!({ "kind": "full" }), start).await
}

/// POST /api/v1/runs/{box_id} - Rerun one box against its cached inputs.
pub async fn run_single(
    State(state): State<AppState>,
    Path(box_id): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), AppError> {
    let start = Instant::now();
    let handle = state.workflow_service.request_run_single(&box_id).await?;
    tracing::info!(box_id = %box_id, "single-box run requested over HTTP");
    respond_to_run(
        handle,
        query.wait,
        json!({ "kind": "single", "box_id": box_id }),
        start,
    )
    .await
}

async fn respond_to_run(
    handle: tokio::task::JoinHandle<RunSummary>,
    wait: bool,
    accepted: Value,
    start: Instant,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), AppError> {
    if !wait {
        return Ok((StatusCode::ACCEPTED, Json(ApiResponse::timed(accepted, start))));
    }

    let summary = handle
        .await
        .map_err(|e| AppError::Internal(format!("run worker failed: {e}")))?;
    let data = serde_json::to_value(&summary).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((StatusCode::OK, Json(ApiResponse::timed(data, start))))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// GET /api/v1/cache - Box ids with a cached result.
pub async fn list_cache(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    let start = Instant::now();
    Json(ApiResponse::timed(state.workflow_service.cached_box_ids(), start))
}

/// GET /api/v1/cache/{box_id} - Last successful output and the inputs used.
pub async fn get_cache_entry(
    State(state): State<AppState>,
    Path(box_id): Path<String>,
) -> Result<Json<ApiResponse<CacheEntry>>, AppError> {
    let start = Instant::now();
    let entry = state
        .workflow_service
        .get_cache_entry(&box_id)
        .ok_or_else(|| AppError::NotFound(format!("no cached output for box '{box_id}'")))?;
    Ok(Json(ApiResponse::timed(entry, start)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbox_types::config::EngineConfig;
    use flowbox_types::workflow::{BoxDefinition, ConnectionDefinition, LayoutPosition};

    fn state() -> AppState {
        AppState::new(EngineConfig::default(), std::env::temp_dir())
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

    fn wait() -> Query<RunQuery> {
        Query(RunQuery { wait: true })
    }

    #[tokio::test]
    async fn load_then_order() {
        let state = state();
        let Json(resp) = load_workflow(State(state.clone()), Json(a_to_b())).await.unwrap();
        assert_eq!(resp.data.unwrap().nodes.len(), 2);

        let Json(resp) = get_order(State(state)).await.unwrap();
        assert_eq!(resp.data.unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn run_without_workflow_conflicts() {
        let err = run_all(State(state()), wait()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Workflow(flowbox_core::service::WorkflowError::Run(
                RunError::NoWorkflowLoaded
            ))
        ));
    }

    #[tokio::test]
    async fn run_and_wait_returns_summary() {
        let state = state();
        load_workflow(State(state.clone()), Json(a_to_b())).await.unwrap();

        let (status, Json(resp)) = run_all(State(state.clone()), wait()).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        let data = resp.data.unwrap();
        assert_eq!(data["state"], json!("completed"));
        assert_eq!(data["succeeded"], json!(["A", "B"]));

        let Json(resp) = get_cache_entry(State(state.clone()), Path("B".to_string()))
            .await
            .unwrap();
        let entry = resp.data.unwrap();
        assert_eq!(Value::Object(entry.output), json!({"y": 2}));

        let (status, Json(resp)) =
            run_single(State(state), Path("B".to_string()), wait()).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.data.unwrap()["kind"], json!("single"));
    }

    #[tokio::test]
    async fn fire_and_forget_is_accepted() {
        let state = state();
        load_workflow(State(state.clone()), Json(a_to_b())).await.unwrap();

        let (status, Json(resp)) = run_all(State(state), Query(RunQuery::default()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(resp.data.unwrap()["kind"], json!("full"));
    }

    #[tokio::test]
    async fn missing_cache_entry_is_not_found() {
        let err = get_cache_entry(State(state()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn layout_update_round_trips() {
        let state = state();
        let mut layout = Layout::new();
        layout.insert("A".to_string(), LayoutPosition { x: 3.0, y: 4.0 });

        let Json(resp) = update_layout(State(state), Json(layout.clone())).await;
        assert_eq!(resp.data.unwrap(), layout);
    }
}
