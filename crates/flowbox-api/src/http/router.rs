//! Axum router configuration with middleware.
//!
//! All API routes are under `/api/v1/`; `/health` sits at the root.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Workflow
        .route(
            "/workflow",
            post(handlers::workflow::load_workflow).get(handlers::workflow::get_workflow),
        )
        .route("/workflow/order", get(handlers::workflow::get_order))
        .route("/workflow/layout", put(handlers::workflow::update_layout))
        // Runs
        .route("/runs", post(handlers::workflow::run_all))
        .route("/runs/{box_id}", post(handlers::workflow::run_single))
        // Cache
        .route("/cache", get(handlers::workflow::list_cache))
        .route("/cache/{box_id}", get(handlers::workflow::get_cache_entry))
        // Status stream
        .route("/ws/status", get(handlers::ws::ws_handler));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus a little engine state.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let service = &state.workflow_service;
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workflow_loaded": service.graph().await.is_some(),
        "running": service.is_running(),
        "step_timeout_secs": state.config.step_timeout_secs,
    }))
}
