//! I/O-tier side of the long-lived duplex stream.
//!
//! One background task owns the WebSocket: it forwards queued envelopes out,
//! surfaces inbound envelopes to the consumer, emits heartbeats, and treats a
//! silent peer (3 missed heartbeat intervals) as a disconnect. Reconnection
//! backs off exponentially from the configured delay up to 60 s. Stopping
//! drains in-flight sends for up to two seconds, then abandons them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fr0g_core::config::{
    StreamConfig, HEARTBEAT_INTERVAL_MAX_MS, HEARTBEAT_INTERVAL_MIN_MS, RECONNECT_DELAY_MAX_MS,
    RECONNECT_DELAY_MIN_MS, STREAM_DIAL_TIMEOUT_SECS,
};

use crate::envelope::Envelope;
use crate::error::{Result, StreamError};

/// Missed heartbeat intervals before the peer counts as gone.
const LIVENESS_MISSES: u32 = 3;
/// Outbound/inbound queue depth; full queues apply backpressure.
const QUEUE_DEPTH: usize = 256;
/// How long `stop` drains in-flight sends.
const DRAIN_WINDOW: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sender half handed to the I/O tier.
#[derive(Clone)]
pub struct StreamHandle {
    outbound: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
}

impl StreamHandle {
    /// Queue an envelope for delivery. Blocks when the queue is full: that
    /// is the stream's backpressure surface.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Non-blocking variant; full queue is reported as backpressure.
    pub fn try_send(&self, envelope: Envelope) -> Result<()> {
        self.outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => StreamError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => StreamError::Closed,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Client driving the duplex connection to the MCP.
pub struct StreamClient;

impl StreamClient {
    /// Spawn the connection task. Returns the send handle and the receiver
    /// of inbound (non-heartbeat) envelopes.
    pub fn start(
        url: String,
        config: StreamConfig,
        cancel: CancellationToken,
    ) -> (StreamHandle, mpsc::Receiver<Envelope>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let connected = Arc::new(AtomicBool::new(false));

        let handle = StreamHandle {
            outbound: outbound_tx,
            connected: connected.clone(),
        };

        tokio::spawn(run_connection(
            url, config, cancel, outbound_rx, inbound_tx, connected,
        ));

        (handle, inbound_rx)
    }
}

/// Clamp the heartbeat interval to its documented bounds.
pub fn heartbeat_interval(config: &StreamConfig) -> Duration {
    Duration::from_millis(
        config
            .heartbeat_interval_ms
            .clamp(HEARTBEAT_INTERVAL_MIN_MS, HEARTBEAT_INTERVAL_MAX_MS),
    )
}

/// Clamp the initial reconnect delay to its documented bounds.
pub fn initial_reconnect_delay(config: &StreamConfig) -> Duration {
    Duration::from_millis(
        config
            .reconnect_delay_ms
            .clamp(RECONNECT_DELAY_MIN_MS, RECONNECT_DELAY_MAX_MS),
    )
}

/// Double the delay, capped at 60 s.
pub fn next_reconnect_delay(current: Duration) -> Duration {
    (current * 2).min(Duration::from_millis(RECONNECT_DELAY_MAX_MS))
}

/// True when the peer has been silent longer than three intervals.
pub fn peer_is_lost(last_seen: Instant, interval: Duration) -> bool {
    last_seen.elapsed() > interval * LIVENESS_MISSES
}

async fn run_connection(
    url: String,
    config: StreamConfig,
    cancel: CancellationToken,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    inbound_tx: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
) {
    let mut delay = initial_reconnect_delay(&config);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let dial = tokio::time::timeout(
            Duration::from_secs(STREAM_DIAL_TIMEOUT_SECS),
            tokio_tungstenite::connect_async(url.as_str()),
        );
        match dial.await {
            Ok(Ok((ws, _))) => {
                info!(%url, "duplex stream connected");
                connected.store(true, Ordering::SeqCst);
                delay = initial_reconnect_delay(&config);
                let ended = drive_session(
                    ws,
                    &config,
                    &cancel,
                    &mut outbound_rx,
                    &inbound_tx,
                )
                .await;
                connected.store(false, Ordering::SeqCst);
                if matches!(ended, SessionEnd::Stopped) {
                    break;
                }
                warn!(%url, "duplex stream disconnected, will reconnect");
            }
            Ok(Err(e)) => {
                warn!(%url, error = %e, "duplex stream dial failed");
            }
            Err(_) => {
                warn!(%url, "duplex stream dial timed out");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }
        delay = next_reconnect_delay(delay);
    }

    info!("duplex stream task exiting");
}

enum SessionEnd {
    /// Cancellation: no reconnect.
    Stopped,
    /// Peer loss or transport error: reconnect.
    Lost,
}

async fn drive_session(
    ws: WsStream,
    config: &StreamConfig,
    cancel: &CancellationToken,
    outbound_rx: &mut mpsc::Receiver<Envelope>,
    inbound_tx: &mpsc::Sender<Envelope>,
) -> SessionEnd {
    let (mut sink, mut source) = ws.split();
    let interval_duration = heartbeat_interval(config);
    let mut heartbeat = tokio::time::interval(interval_duration);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_peer = Instant::now();

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => {
                let Some(envelope) = queued else {
                    return SessionEnd::Stopped;
                };
                let Ok(text) = envelope.encode() else {
                    warn!(envelope_id = %envelope.envelope_id, "dropping unencodable envelope");
                    continue;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "send failed mid-session");
                    return SessionEnd::Lost;
                }
            }

            received = source.next() => {
                match received {
                    Some(Ok(Message::Text(text))) => {
                        last_peer = Instant::now();
                        match Envelope::decode(&text) {
                            Ok(envelope) if envelope.is_heartbeat() => {
                                debug!("peer heartbeat");
                            }
                            Ok(envelope) => {
                                // Blocking here is the receive-pause the
                                // backpressure contract describes.
                                if inbound_tx.send(envelope).await.is_err() {
                                    return SessionEnd::Stopped;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "malformed envelope, ignoring");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        last_peer = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Lost;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stream read error");
                        return SessionEnd::Lost;
                    }
                    _ => {}
                }
            }

            _ = heartbeat.tick() => {
                if peer_is_lost(last_peer, interval_duration) {
                    warn!("peer heartbeats missing, reconnecting");
                    return SessionEnd::Lost;
                }
                let hb = Envelope::heartbeat();
                if let Ok(text) = hb.encode() {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
            }

            _ = cancel.cancelled() => {
                drain_outbound(&mut sink, outbound_rx).await;
                let _ = sink.close().await;
                return SessionEnd::Stopped;
            }
        }
    }
}

/// Flush queued envelopes for up to the drain window, then abandon the rest.
async fn drain_outbound(
    sink: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
              + Unpin),
    outbound_rx: &mut mpsc::Receiver<Envelope>,
) {
    let deadline = Instant::now() + DRAIN_WINDOW;
    let mut drained = 0usize;
    while let Ok(envelope) = outbound_rx.try_recv() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(drained, "drain window elapsed, abandoning queued envelopes");
            return;
        }
        let Ok(text) = envelope.encode() else {
            continue;
        };
        match tokio::time::timeout(remaining, sink.send(Message::Text(text.into()))).await {
            Ok(Ok(())) => drained += 1,
            _ => {
                warn!(drained, "send failed during drain");
                return;
            }
        }
    }
    debug!(drained, "outbound queue drained");
}
