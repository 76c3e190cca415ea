//! `WS /vault/:v/ws?deviceId=<id>` (§4.7): the real-time fan-out channel.
//!
//! One task per open socket. Inbound frames are JSON-encoded
//! [`ChannelMessage`]s; each is resolved with [`realtime::handle_inbound`]
//! under the vault's writer lock, on the blocking pool (CRDT application and
//! the resulting Content Store commit are both blocking work). Outbound
//! frames are whatever the channel table queues: broadcasts from peers,
//! heartbeat pings, and direct replies to this socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::AppState;
use crate::realtime::{self, ChannelMessage};
use crate::registry::VaultHandle;

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(rename = "deviceId")]
    device_id: String,
}

/// `GET /vault/:v/ws?deviceId=<id>` upgrade handler.
pub async fn upgrade(
    State(state): State<AppState>,
    Path(vault): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, crate::error::VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    Ok(ws.on_upgrade(move |socket| run_channel(socket, handle, query.device_id)))
}

async fn run_channel(socket: WebSocket, handle: Arc<VaultHandle>, device_id: String) {
    let now = crate::time::now_secs();
    let opened = handle.channels.open(&device_id, now);
    let crate::realtime::OpenedChannel { channel, mut outbound_rx, mut close_rx } = opened;

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;

            _ = &mut close_rx => {
                tracing::debug!(vault = %handle.vault_name, device_id, "channel displaced, closing socket");
                break;
            }

            outgoing = outbound_rx.recv() => {
                let Some(msg) = outgoing else { break };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(&handle, &channel, &device_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Binary/ping/pong at the WebSocket protocol level carry
                        // no application meaning here (§4.7's own ping/pong are
                        // JSON frames, handled above).
                    }
                    Some(Err(e)) => {
                        tracing::warn!(vault = %handle.vault_name, device_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    handle.channels.close(&device_id, &channel);
}

async fn handle_text_frame(
    handle: &Arc<VaultHandle>,
    channel: &Arc<crate::realtime::Channel>,
    device_id: &str,
    text: &str,
) {
    let now = crate::time::now_secs();
    let msg: ChannelMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            channel.send(ChannelMessage::error(&handle.vault_name, device_id, now, format!("malformed frame: {e}")));
            return;
        }
    };

    channel.touch(now);

    let reply = {
        let handle = Arc::clone(handle);
        let msg = msg.clone();
        let device_id = device_id.to_owned();
        let _permit = handle.writer_lock.lock().await;
        let task_handle = Arc::clone(&handle);
        tokio::task::spawn_blocking(move || {
            realtime::handle_inbound(
                &task_handle.channels,
                task_handle.as_ref(),
                &task_handle.text_crdt,
                &task_handle.structure_crdt,
                &task_handle.vault_name,
                &device_id,
                &msg,
                crate::time::now_secs(),
            )
        })
        .await
        .unwrap_or(None)
    };

    if let Some(reply) = reply {
        channel.send(reply);
    }
}
