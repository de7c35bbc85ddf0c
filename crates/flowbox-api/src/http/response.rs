//! Envelope response format for all API responses.
//!
//! Every response is wrapped in a consistent envelope:
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": []
//! }
//! ```

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

/// Envelope response wrapping all API data.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// The main response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Request metadata.
    pub meta: ApiMeta,

    /// Error list (empty on success).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,
}

/// Metadata included in every response.
#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
    pub response_time_ms: u64,
}

/// Individual error detail.
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiMeta {
    fn now(request_id: String, response_time_ms: u64) -> Self {
        Self {
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response with data.
    pub fn success(data: T, request_id: String, response_time_ms: u64) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::now(request_id, response_time_ms),
            errors: Vec::new(),
        }
    }

    /// Success response timed from `start` with a fresh request id.
    pub fn timed(data: T, start: Instant) -> Self {
        Self::success(
            data,
            Uuid::now_v7().to_string(),
            start.elapsed().as_millis() as u64,
        )
    }
}

impl ApiResponse<()> {
    /// Create an error response (no data).
    pub fn error(code: &str, message: &str, details: Option<serde_json::Value>) -> Self {
        Self {
            data: None,
            meta: ApiMeta::now(Uuid::now_v7().to_string(), 0),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
                details,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_omits_errors() {
        let resp = ApiResponse::success(json!({"ok": true}), "req-1".to_string(), 3);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["data"], json!({"ok": true}));
        assert_eq!(value["meta"]["request_id"], json!("req-1"));
        assert!(value.get("errors").is_none());
    }

    #[test]
    fn error_envelope_omits_data() {
        let resp = ApiResponse::error("NOT_FOUND", "box 'x' not found", None);
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(value["errors"][0]["code"], json!("NOT_FOUND"));
        assert!(value["errors"][0].get("details").is_none());
    }
}
