//! OCPP 1.6-JSON WebSocket server (spec.md §4.1, §4.2; SPEC_FULL.md §3.5,
//! §3.6) — grounded on the teacher's `interfaces/ws/ocpp_server.rs`: a bare
//! `tokio_tungstenite` listener (not axum's `ws` extractor), one task pair
//! per station connection.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::charging::{
    ChargingLifecycleEngine, CommandRouter, MalformedFrameTracker, RoutedCommand, StationConnection,
    StationRegistry,
};
use crate::domain::RepositoryProvider;
use crate::ocpp::session_handler::{InboundOutcome, SessionHandler};
use crate::shared::shutdown::ShutdownSignal;

const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// Decrements the open-connection count on every exit path of
/// `handle_connection` (normal close, handshake failure, panic unwind).
struct OpenConnectionGuard<'a>(&'a AtomicUsize);

impl Drop for OpenConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded FIFO set used to drop at-least-once command redeliveries
/// (spec.md §4.4): keeps the last 1024 nonces seen on this connection.
struct NonceDedup {
    order: VecDeque<u64>,
    seen: HashSet<u64>,
    capacity: usize,
}

impl NonceDedup {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `true` if this is the first time `nonce` has been seen.
    fn insert(&mut self, nonce: u64) -> bool {
        if !self.seen.insert(nonce) {
            return false;
        }
        self.order.push_back(nonce);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

pub struct OcppServer {
    host: String,
    port: u16,
    call_timeout: Duration,
    heartbeat_interval: Duration,
    boot_accept: bool,
    max_sockets: usize,
    open_connections: AtomicUsize,
    repos: Arc<dyn RepositoryProvider>,
    lifecycle: Arc<ChargingLifecycleEngine>,
    registry: Arc<StationRegistry>,
    command_router: Arc<CommandRouter>,
    shutdown: ShutdownSignal,
}

impl OcppServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: String,
        port: u16,
        call_timeout: Duration,
        heartbeat_interval: Duration,
        boot_accept: bool,
        max_sockets: usize,
        repos: Arc<dyn RepositoryProvider>,
        lifecycle: Arc<ChargingLifecycleEngine>,
        registry: Arc<StationRegistry>,
        command_router: Arc<CommandRouter>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            host,
            port,
            call_timeout,
            heartbeat_interval,
            boot_accept,
            max_sockets,
            open_connections: AtomicUsize::new(0),
            repos,
            lifecycle,
            registry,
            command_router,
            shutdown,
        }
    }

    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(addr, "OCPP 1.6 server listening, connect at ws://{addr}/ws/{{station_id}}");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.clone().spawn_connection(stream, peer),
                        Err(e) => error!(error = %e, "failed to accept TCP connection"),
                    }
                }
                _ = self.shutdown.notified().wait() => {
                    info!("OCPP server shutting down, no longer accepting new connections");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        tokio::spawn(async move {
            if let Err(e) = self.handle_connection(stream, peer).await {
                error!(peer = %peer, error = %e, "connection terminated with error");
            }
        });
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Open-socket cap (spec.md §5): excess connections are accepted at
        // the WS layer but immediately closed with a close code and a
        // retry hint, rather than left to hang at the TCP accept queue.
        if self.open_connections.fetch_add(1, Ordering::SeqCst) >= self.max_sockets {
            self.open_connections.fetch_sub(1, Ordering::SeqCst);
            warn!(peer = %peer, max_sockets = self.max_sockets, "rejecting connection, process socket cap reached");
            if let Ok(mut ws_stream) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws_stream
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Again,
                        reason: "socket cap reached, retry later".into(),
                    })))
                    .await;
            }
            return Ok(());
        }
        let _open_guard = OpenConnectionGuard(&self.open_connections);

        let mut station_id: Option<String> = None;

        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, mut response: Response| {
            let path = req.uri().path();
            station_id = extract_station_id(path);

            let requested = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if requested.split(',').map(str::trim).any(|p| p == OCPP_SUBPROTOCOL) {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", OCPP_SUBPROTOCOL.parse().unwrap());
            }
            Ok(response)
        })
        .await?;

        let Some(station_id) = station_id else {
            warn!(peer = %peer, "rejecting connection with no station id in path");
            return Ok(());
        };
        info!(station_id = station_id.as_str(), peer = %peer, "station connected");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (write_tx, mut write_rx) = mpsc::channel::<Message>(64);
        let (close_tx, mut close_rx) = mpsc::channel(1);

        let (epoch, outcome) = self.registry.register(&station_id, close_tx, self.heartbeat_interval);
        if let crate::charging::RegisterOutcome::Replaced { previous_epoch } = outcome {
            warn!(station_id = station_id.as_str(), previous_epoch, epoch, "replaced a prior connection");
        }

        let connection = Arc::new(StationConnection::new(write_tx.clone(), self.call_timeout));
        let session_handler = SessionHandler::new(
            station_id.clone(),
            self.repos.clone(),
            self.lifecycle.clone(),
            connection.clone(),
            self.boot_accept,
            self.heartbeat_interval.as_secs() as i64,
        );
        let malformed_tracker = MalformedFrameTracker::new();

        let send_task = tokio::spawn(async move {
            while let Some(msg) = write_rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    error!(error = %e, "websocket send failed");
                    break;
                }
            }
        });

        let command_rx = self.command_router.subscribe(&station_id);
        let forward_task = tokio::spawn(forward_commands(station_id.clone(), command_rx, connection.clone()));

        let registry = self.registry.clone();
        let heartbeat_interval = self.heartbeat_interval;
        let shutdown = self.shutdown.clone();
        let station_id_loop = station_id.clone();

        loop {
            tokio::select! {
                incoming = ws_receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            registry.touch(&station_id_loop, heartbeat_interval);
                            match session_handler.handle(&text).await {
                                InboundOutcome::Reply(reply) => {
                                    if write_tx.send(Message::Text(reply)).await.is_err() {
                                        break;
                                    }
                                    if session_handler.should_close() {
                                        warn!(station_id = station_id_loop.as_str(), "closing after repeated BootNotification rejects");
                                        let _ = write_tx.send(Message::Close(None)).await;
                                        break;
                                    }
                                }
                                InboundOutcome::NoReply => {}
                                InboundOutcome::Malformed => {
                                    if malformed_tracker.record() {
                                        warn!(station_id = station_id_loop.as_str(), "closing connection after repeated malformed frames");
                                        let _ = write_tx.send(Message::Close(None)).await;
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write_tx.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) => {
                            info!(station_id = station_id_loop.as_str(), "station closed the connection");
                            break;
                        }
                        Some(Ok(Message::Binary(_) | Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            error!(station_id = station_id_loop.as_str(), error = %e, "websocket error");
                            break;
                        }
                        None => break,
                    }
                }
                _ = close_rx.recv() => {
                    info!(station_id = station_id_loop.as_str(), "administrative close requested");
                    let _ = write_tx.send(Message::Close(None)).await;
                    break;
                }
                _ = shutdown.notified().wait() => {
                    info!(station_id = station_id_loop.as_str(), "connection closing for server shutdown");
                    let _ = write_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        drop(write_tx);
        forward_task.abort();
        let _ = send_task.await;
        self.registry.unregister(&station_id, epoch);
        info!(station_id = station_id.as_str(), "station disconnected");
        Ok(())
    }
}

async fn forward_commands(
    station_id: String,
    mut rx: broadcast::Receiver<Vec<u8>>,
    connection: Arc<StationConnection>,
) {
    let mut dedup = NonceDedup::new(1024);
    loop {
        match rx.recv().await {
            Ok(bytes) => {
                let command: RoutedCommand = match serde_json::from_slice(&bytes) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(station_id = station_id.as_str(), error = %e, "failed to decode routed command");
                        continue;
                    }
                };
                if !dedup.insert(command.nonce) {
                    continue;
                }
                let connection = connection.clone();
                let station_id = station_id.clone();
                tokio::spawn(async move {
                    let action_name = command.action.action_name();
                    match connection.call(action_name, command.action.payload()).await {
                        Ok(_) => info!(station_id = station_id.as_str(), action = action_name, "command acknowledged"),
                        Err(e) => warn!(station_id = station_id.as_str(), action = action_name, error = %e, "command delivery failed"),
                    }
                });
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(station_id = station_id.as_str(), skipped, "command channel lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `/ws/{station_id}` or bare `/{station_id}`.
fn extract_station_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');
    if let Some(id) = path.strip_prefix("ws/") {
        let id = id.trim_start_matches('/');
        return (!id.is_empty()).then(|| id.to_owned());
    }
    if !path.is_empty() && !path.contains('/') {
        return Some(path.to_owned());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_station_id_accepts_ws_prefixed_path() {
        assert_eq!(extract_station_id("/ws/CP1"), Some("CP1".to_owned()));
    }

    #[test]
    fn extract_station_id_accepts_bare_path() {
        assert_eq!(extract_station_id("/CP1"), Some("CP1".to_owned()));
    }

    #[test]
    fn extract_station_id_rejects_empty_and_nested_paths() {
        assert_eq!(extract_station_id("/ws/"), None);
        assert_eq!(extract_station_id("/"), None);
        assert_eq!(extract_station_id("/CP1/extra"), None);
    }

    #[test]
    fn nonce_dedup_rejects_repeats_and_evicts_oldest_past_capacity() {
        let mut dedup = NonceDedup::new(2);
        assert!(dedup.insert(1));
        assert!(!dedup.insert(1), "a repeated nonce is rejected");
        assert!(dedup.insert(2));
        assert!(dedup.insert(3), "pushes nonce 1 out of the window");
        assert!(dedup.insert(1), "nonce 1 is accepted again once evicted");
    }
}
