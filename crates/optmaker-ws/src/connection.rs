//! WebSocket connection manager.
//!
//! Handles the connection lifecycle: handshake with custom headers, the
//! message loop, transport heartbeat and reconnection with capped
//! exponential backoff. Consumers see the connection only through the
//! inbound `WsEvent` channel and a cloneable `WsWriteHandle`.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::write_handle::{WsOutbound, WsWriteHandle};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Label used in logs and metrics ("rfq", "exchange", "relay:arbitrum").
    pub name: String,
    /// WebSocket URL.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Vec<(String, String)>,
    /// Maximum consecutive reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Heartbeat interval.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this after a ping.
    pub heartbeat_timeout_ms: u64,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: "ws".to_string(),
            url: String::new(),
            headers: Vec::new(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 300_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected with a ping outstanding.
    AwaitingHeartbeat,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Connected | Self::AwaitingHeartbeat)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AwaitingHeartbeat => "awaiting_heartbeat",
        }
    }
}

/// Inbound event delivered to the connection's consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// A session opened. Consumers re-subscribe here.
    Connected,
    Text(String),
    Binary(Vec<u8>),
    /// The session ended. A reconnect follows unless shutting down.
    Disconnected,
}

/// Reconnect delay for the `attempt`-th consecutive failure (0-based):
/// `min(base * 2^attempt, max)`.
pub fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: Arc<HeartbeatManager>,
    event_tx: mpsc::Sender<WsEvent>,
    reconnect_count: Arc<AtomicU32>,
    outbound_tx: mpsc::Sender<WsOutbound>,
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<WsOutbound>>>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, event_tx: mpsc::Sender<WsEvent>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let heartbeat = Arc::new(HeartbeatManager::new(
            config.heartbeat_interval_ms,
            config.heartbeat_timeout_ms,
        ));
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            heartbeat,
            event_tx,
            reconnect_count: Arc::new(AtomicU32::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Tie this connection to an externally owned shutdown token.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get a write handle for sending frames.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(self.outbound_tx.clone(), self.state.clone())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed reconnect attempts since the last successful open.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Signal graceful shutdown. The message loop sends a close frame and
    /// the reconnect loop exits.
    pub fn shutdown(&self) {
        info!(name = %self.config.name, "ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run until shutdown.
    ///
    /// # Errors
    /// Fails if the very first handshake fails, or if
    /// `max_reconnect_attempts` consecutive reconnects fail. Every other
    /// transport error is logged and followed by a reconnect.
    pub async fn connect(&self) -> WsResult<()> {
        let mut stream = match self.open().await {
            Ok(stream) => stream,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                error!(name = %self.config.name, error = %e, "Initial connection failed");
                return Err(e);
            }
        };

        loop {
            match self.run_session(stream).await {
                Ok(()) => info!(name = %self.config.name, "WebSocket session ended"),
                Err(e) => warn!(name = %self.config.name, error = %e, "WebSocket session error"),
            }
            *self.state.write() = ConnectionState::Disconnected;
            self.emit(WsEvent::Disconnected).await;

            stream = match self.reconnect().await? {
                Some(stream) => stream,
                None => return Ok(()),
            };
        }
    }

    /// Retry the handshake with backoff. `Ok(None)` on shutdown.
    async fn reconnect(&self) -> WsResult<Option<WsStream>> {
        let mut attempt = 0u32;
        loop {
            if self.is_shutdown() {
                info!(name = %self.config.name, "Shutdown requested, not reconnecting");
                return Ok(None);
            }
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(name = %self.config.name, attempt, "Max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(
                    "max reconnection attempts reached".to_string(),
                ));
            }

            let delay = backoff_delay(
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
                attempt,
            );
            attempt += 1;
            self.reconnect_count.store(attempt, Ordering::Relaxed);
            warn!(
                name = %self.config.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!(name = %self.config.name, "Shutdown requested during backoff");
                    return Ok(None);
                }
            }

            match self.open().await {
                Ok(stream) => return Ok(Some(stream)),
                Err(e) => {
                    *self.state.write() = ConnectionState::Disconnected;
                    warn!(name = %self.config.name, attempt, error = %e, "Reconnect failed");
                }
            }
        }
    }

    async fn open(&self) -> WsResult<WsStream> {
        *self.state.write() = ConnectionState::Connecting;
        info!(name = %self.config.name, url = %self.config.url, "Connecting to WebSocket");

        let mut request = self.config.url.as_str().into_client_request()?;
        for (name, value) in &self.config.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| WsError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| WsError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            request.headers_mut().insert(header_name, header_value);
        }

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (stream, _response) = tokio::time::timeout(
            timeout,
            connect_async_tls_with_config(request, None, true, None),
        )
        .await
        .map_err(|_| WsError::ConnectionFailed("handshake timed out".to_string()))??;

        *self.state.write() = ConnectionState::Connected;
        self.reconnect_count.store(0, Ordering::Relaxed);
        self.heartbeat.reset();
        info!(name = %self.config.name, "WebSocket connected");
        self.emit(WsEvent::Connected).await;
        Ok(stream)
    }

    async fn run_session(&self, stream: WsStream) -> WsResult<()> {
        let (mut write, mut read) = stream.split();

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!(name = %self.config.name, "Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            self.emit(WsEvent::Text(text)).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.heartbeat.record_message();
                            self.emit(WsEvent::Binary(data)).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                            *self.state.write() = ConnectionState::Connected;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(name = %self.config.name, code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!(name = %self.config.name, "WebSocket stream ended");
                            return Ok(());
                        }
                    }
                }

                outbound = outbound_recv => {
                    match outbound {
                        Some(WsOutbound::Text(text)) => write.send(Message::Text(text)).await?,
                        Some(WsOutbound::Binary(data)) => write.send(Message::Binary(data)).await?,
                        None => {}
                    }
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!(name = %self.config.name, "Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        *self.state.write() = ConnectionState::AwaitingHeartbeat;
                        debug!(name = %self.config.name, "Sent heartbeat ping");
                    }
                }
            }
        }
    }

    async fn emit(&self, event: WsEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!(name = %self.config.name, "Event receiver dropped");
        }
    }
}
