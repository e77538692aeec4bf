//! Change stream for an owner's views.
//!
//! Connection lifecycle:
//! 1. Client opens `GET /ws/owners/:owner`
//! 2. Server sends a `snapshot` of the medicine list
//! 3. Every `ChangeEvent` on the owner's topic is sent as `changed`;
//!    a subscriber that fell behind gets a fresh `snapshot` instead
//! 4. Heartbeat ping every 30s until the client closes

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::api::error::ApiError;
use crate::api::types::{owner_from_path, ApiContext};
use crate::core_state::CoreState;
use crate::events::ChangeEvent;
use crate::models::{Medicine, OwnerId};

/// Heartbeat interval: server pings every 30 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Messages sent to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Snapshot {
        owner: OwnerId,
        medicines: Vec<Medicine>,
    },
    Changed {
        event: ChangeEvent,
    },
}

/// WebSocket upgrade handler.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = owner_from_path(&owner)?;
    tracing::info!(owner = %owner, "Change stream upgrade accepted");
    let core = ctx.core.clone();
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, core, owner)))
}

fn snapshot(core: &CoreState, owner: &OwnerId) -> StreamMessage {
    StreamMessage::Snapshot {
        owner: owner.clone(),
        medicines: core.store().load(owner),
    }
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, msg: &StreamMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot encode stream message");
            return true;
        }
    };
    sink.send(Message::Text(json)).await.is_ok()
}

async fn handle_ws(socket: WebSocket, core: Arc<CoreState>, owner: OwnerId) {
    // Subscribe before the snapshot so nothing saved in between is missed.
    let mut events = core.bus().subscribe(&owner);
    let (mut sink, mut stream) = socket.split();

    if !send(&mut sink, &snapshot(&core, &owner)).await {
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            event = events.recv() => {
                let msg = match event {
                    Ok(event) => StreamMessage::Changed { event },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(owner = %owner, skipped, "Change stream lagged, resending snapshot");
                        snapshot(&core, &owner)
                    }
                    Err(RecvError::Closed) => break,
                };
                if !send(&mut sink, &msg).await {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Pings are answered by axum; client text is ignored
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    tracing::info!(owner = %owner, "Change stream disconnected");
}
