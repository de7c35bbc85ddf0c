//! WebSocket handler streaming run status to presentation clients.
//!
//! `/ws/status` upgrades the connection, subscribes to the workflow status
//! channel, and forwards every [`WorkflowEvent`] as a JSON text frame, in
//! the order the run worker emitted them.
//!
//! Clients may also send commands: `ping`, `run_all`, and `run_single`.
//! Rejections (e.g. a run already in progress) come back as an `error`
//! frame on the same socket. Disconnecting does not stop a run in flight.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use flowbox_core::service::WorkflowService;

use crate::state::AppState;

/// Incoming command from a WebSocket client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    /// Start a full run.
    RunAll,
    /// Rerun one box against its cached inputs.
    RunSingle { box_id: String },
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

/// Server replies that are not status events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsReply {
    Pong,
    /// A command was rejected or lagging dropped events.
    Error { code: String, message: String },
}

/// GET /ws/status - Upgrade to the status stream.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Multiplex status events out and client commands in on one task.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut event_rx = state.workflow_service.subscribe();

    loop {
        tokio::select! {
            event_result = event_rx.recv() => {
                match event_result {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!("Failed to serialize WorkflowEvent: {err}");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "WebSocket subscriber lagged, skipping {n} events");
                        let reply = WsReply::Error {
                            code: "LAGGED".to_string(),
                            message: format!("{n} status events were dropped"),
                        };
                        if send_reply(&mut ws_sender, &reply).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = process_command(&text, &state.workflow_service).await {
                            if send_reply(&mut ws_sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!("WebSocket receive error: {err}");
                        break;
                    }
                    // Binary, ping and pong frames are handled by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("WebSocket connection closed");
}

async fn send_reply(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    reply: &WsReply,
) -> Result<(), axum::Error> {
    match serde_json::to_string(reply) {
        Ok(json) => ws_sender.send(Message::Text(json.into())).await,
        Err(err) => {
            tracing::warn!("Failed to serialize WebSocket reply: {err}");
            Ok(())
        }
    }
}

/// Parse and act on one client command. Returns the reply to send, if any.
///
/// Accepted runs produce no reply; their progress arrives as status events.
async fn process_command(text: &str, service: &WorkflowService) -> Option<WsReply> {
    let cmd: WsCommand = match serde_json::from_str(text) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::warn!(raw = %text, error = %err, "Ignoring malformed WebSocket command");
            return None;
        }
    };

    let requested = match cmd {
        WsCommand::Ping => return Some(WsReply::Pong),
        WsCommand::RunAll => service.request_run_all().await,
        WsCommand::RunSingle { box_id } => service.request_run_single(&box_id).await,
    };

    match requested {
        Ok(_handle) => None,
        Err(e) => Some(WsReply::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        }),
    }
}
