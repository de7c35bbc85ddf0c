//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowbox_core::service::WorkflowError;
use flowbox_types::error::RunError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors from the workflow service (validation or admission).
    Workflow(WorkflowError),
    /// A resource that does not exist.
    NotFound(String),
    /// Generic internal error.
    Internal(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        AppError::Workflow(WorkflowError::Run(e))
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
        match self {
            AppError::Workflow(WorkflowError::Validation(e)) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                e.to_string(),
                Some(json!({ "kind": e.code() })),
            ),
            AppError::Workflow(WorkflowError::Run(e @ RunError::UnknownBox(_))) => {
                (StatusCode::NOT_FOUND, e.code(), e.to_string(), None)
            }
            AppError::Workflow(WorkflowError::Run(e)) => {
                (StatusCode::CONFLICT, e.code(), e.to_string(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                None,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::debug!(code, %message, "request rejected");
        }
        (status, Json(ApiResponse::error(code, &message, details))).into_response()
    }
}
