//! Server half of the push channel: one WebSocket session per live viewer.
//!
//! The session validates the token before registering, relays queued fan-out
//! frames to the wire, answers the client's text `"ping"` probes with
//! `"pong"`, and unregisters synchronously the moment the socket closes —
//! the registry never holds a dead connection.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use hubcast::types::PushFrame;
use hubcast::ws::CLOSE_CODE_AUTH_FAILED;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ApiState;

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    token: Option<String>,
    consumer: Option<String>,
}

pub async fn workspace_ws(
    ws: WebSocketUpgrade,
    Path(workspace_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_push_socket(socket, state, workspace_id, query))
}

async fn handle_push_socket(
    mut socket: WebSocket,
    state: ApiState,
    workspace_id: String,
    query: WsQuery,
) {
    // Browsers cannot set headers on a WebSocket handshake, so the credential
    // rides the query string and is checked after the upgrade.
    if !state.token_allowed(query.token.as_deref()) {
        warn!(workspace_id, "push handshake rejected: invalid token");
        let _ = socket
            .send(WsMessage::Close(Some(CloseFrame {
                code: CLOSE_CODE_AUTH_FAILED,
                reason: "invalid token".to_string().into(),
            })))
            .await;
        return;
    }

    let principal = query
        .consumer
        .unwrap_or_else(|| format!("viewer:{}", Uuid::new_v4()));
    let (handle, mut frames_rx) = state.registry.register(&workspace_id, principal);
    info!(workspace_id, connection_id = handle.id(), "push client connected");

    let confirmation = PushFrame::Connected {
        workspace_id: workspace_id.clone(),
    };
    if let Ok(payload) = serde_json::to_string(&confirmation) {
        if socket.send(WsMessage::Text(payload.into())).await.is_err() {
            state.registry.unregister(&workspace_id, handle.id());
            return;
        }
    }

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        if text.as_str() == "ping" {
                            handle.note_ping();
                            if socket
                                .send(WsMessage::Text("pong".to_string().into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            debug!(workspace_id, "ignoring unexpected client frame");
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        debug!(workspace_id, error = %err, "push socket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            queued = frames_rx.recv() => {
                match queued {
                    Some(payload) => {
                        if socket.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // The broadcaster tore this connection down after a failed
                    // delivery; finish the close from our side.
                    None => {
                        let _ = socket.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(&workspace_id, handle.id());
    info!(workspace_id, connection_id = handle.id(), "push client disconnected");
}
