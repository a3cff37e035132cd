//! MCP side of the duplex stream: GET /stream upgrades to WebSocket.
//!
//! Inbound envelopes carry input events from the I/O tier; they run through
//! the channel processor and the workflow engine, and the resulting analysis
//! and commands go back out over the same (or any) connected stream.
//! Heartbeats flow both ways; a peer silent for three intervals is dropped
//! and expected to reconnect.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fr0g_stream::duplex::{heartbeat_interval, peer_is_lost};
use fr0g_stream::Envelope;

use crate::app::AppState;

/// Outbound frame queue per connection.
const PEER_QUEUE_DEPTH: usize = 256;

/// Axum handler: upgrades HTTP to WebSocket at GET /stream.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task: lives for the whole stream session.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "stream peer connected");

    let (mut sink, mut source) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(PEER_QUEUE_DEPTH);
    state.stream_clients.insert(conn_id.clone(), outbound_tx);

    let interval_duration = heartbeat_interval(&state.config.stream);
    let mut heartbeat = tokio::time::interval(interval_duration);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_peer = Instant::now();

    loop {
        tokio::select! {
            // Workflow output (or per-connection replies) → peer.
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            // Peer → MCP.
            received = source.next() => {
                match received {
                    Some(Ok(Message::Text(text))) => {
                        last_peer = Instant::now();
                        handle_frame(&state, &conn_id, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_peer = Instant::now();
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_peer = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id, error = %e, "stream read error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = heartbeat.tick() => {
                if peer_is_lost(last_peer, interval_duration) {
                    warn!(conn_id, "peer heartbeats missing, dropping connection");
                    break;
                }
                let Ok(frame) = Envelope::heartbeat().encode() else { continue };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            _ = state.cancel.cancelled() => {
                debug!(conn_id, "server shutting down, closing stream");
                let _ = sink.close().await;
                break;
            }
        }
    }

    state.stream_clients.remove(&conn_id);
    info!(conn_id, "stream peer disconnected");
}

/// Decode one inbound frame and route it.
async fn handle_frame(state: &Arc<AppState>, conn_id: &str, text: &str) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(conn_id, error = %e, "malformed stream envelope, ignoring");
            return;
        }
    };
    if envelope.is_heartbeat() {
        return;
    }

    let event = match envelope.as_input_event() {
        Ok(event) => event,
        Err(e) => {
            warn!(conn_id, error = %e, "unexpected stream payload, ignoring");
            return;
        }
    };

    debug!(conn_id, event_id = %event.id, channel = %event.kind, "stream event received");

    // Same pipeline as the webhook path: first-pass classification, then the
    // workflow engine. Per-sender ordering is preserved because this await
    // completes before the next frame from this connection is read.
    let first_pass = state
        .processors
        .get(event.kind)
        .filter(|p| p.enabled())
        .map(|p| p.process(&event));

    let analysis = first_pass.as_ref().and_then(|r| r.analysis.as_ref());
    if let Err(e) = state
        .workflows
        .process_input_event(&event, analysis, &state.cancel)
        .await
    {
        warn!(event_id = %event.id, error = %e, "stream event workflow failed");
        return;
    }

    // The workflow engine dispatches its own commands; the channel's
    // first-pass actions go back over this connection.
    if let Some(first_pass) = first_pass {
        if let Some(sender) = state.stream_clients.get(conn_id) {
            for action in &first_pass.actions {
                let Ok(frame) = Envelope::output_command(action).and_then(|e| e.encode()) else {
                    continue;
                };
                if sender.try_send(frame).is_err() {
                    warn!(conn_id, "peer queue full, first-pass action dropped");
                }
            }
        }
    }
}
