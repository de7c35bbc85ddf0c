//! HTTP/WebSocket API layer for flowbox.
//!
//! Axum-based API at `/api/v1/` with the envelope response format, a
//! WebSocket status stream, and CORS support.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
