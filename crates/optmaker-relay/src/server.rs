//! Internal distribution server.
//!
//! Consumers connect to `/ws`, subscribe to chains and pairs, and receive
//! the filtered, deduplicated relay stream. A subscribe replays matching
//! cache entries first. Slow clients lag on their own broadcast receiver and
//! never hold up the distribution loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use optmaker_core::{Address, Clock};
use optmaker_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::RelayCache;
use crate::distributor::TokenFilter;
use crate::error::RelayResult;
use crate::event::{Level, PriceEvent};
use crate::subscription::Subscription;

#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub port: u16,
    pub ping_interval_ms: u64,
    pub max_connections: usize,
    /// Dedup entries untouched for this long are dropped.
    pub dedup_retention_ms: i64,
    pub cleanup_interval_ms: u64,
    /// Only pairs involving one of these are distributed. Empty means all.
    pub tracked_tokens: Vec<Address>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            ping_interval_ms: 30_000,
            max_connections: 256,
            dedup_retention_ms: 300_000,
            cleanup_interval_ms: 60_000,
            tracked_tokens: Vec::new(),
        }
    }
}

/// Messages a consumer may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        chains: Vec<u32>,
        #[serde(default)]
        pairs: Vec<String>,
    },
    Unsubscribe {
        #[serde(default)]
        chains: Vec<u32>,
        #[serde(default)]
        pairs: Vec<String>,
    },
    Ping,
}

/// Messages sent to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Price {
        chain_id: u32,
        pair: String,
        base: String,
        quote: String,
        bids: Vec<Level>,
        asks: Vec<Level>,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Status {
        connections: usize,
        subscribed_chains: Vec<u32>,
        subscribed_pairs: Vec<String>,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn price(event: &PriceEvent) -> Self {
        Self::Price {
            chain_id: event.chain_id,
            pair: event.pair.clone(),
            base: format!("0x{}", hex::encode(event.base)),
            quote: format!("0x{}", hex::encode(event.quote)),
            bids: event.bids.clone(),
            asks: event.asks.clone(),
            timestamp: event.timestamp,
        }
    }

    fn status(connections: usize, subscription: &Subscription) -> Self {
        Self::Status {
            connections,
            subscribed_chains: subscription.chains().collect(),
            subscribed_pairs: subscription.pairs().map(str::to_string).collect(),
        }
    }
}

/// Caps concurrent consumer connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot, released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let previous = self.limiter.current.fetch_sub(1, Ordering::Release);
        Metrics::distribution_clients(previous.saturating_sub(1));
    }
}

#[derive(Clone)]
struct ServerState {
    cache: Arc<RelayCache>,
    events: broadcast::Sender<Arc<PriceEvent>>,
    filter: TokenFilter,
    limiter: Arc<ConnectionLimiter>,
    clock: Arc<dyn Clock>,
    ping_interval: Duration,
}

pub struct DistributionServer {
    config: DistributionConfig,
    state: ServerState,
}

impl DistributionServer {
    /// `events` is the distributor's output channel; `cache` is the relay
    /// cache used for replay.
    pub fn new(
        config: DistributionConfig,
        cache: Arc<RelayCache>,
        events: broadcast::Sender<Arc<PriceEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = ServerState {
            cache,
            events,
            filter: TokenFilter::new(config.tracked_tokens.iter().copied()),
            limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            clock,
            ping_interval: Duration::from_millis(config.ping_interval_ms.max(1)),
        };
        Self { config, state }
    }

    pub fn connections(&self) -> usize {
        self.state.limiter.current_count()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> RelayResult<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "Distribution server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        info!("Distribution server stopped");
        Ok(())
    }

    /// Bind `0.0.0.0:{port}` and serve until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> RelayResult<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }
}

async fn metrics_handler() -> Response {
    match Metrics::encode() {
        Ok(body) => body.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn ws_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.limiter.try_acquire() else {
        warn!(
            current = state.limiter.current_count(),
            "Distribution connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };
    ws.on_upgrade(move |socket| handle_client(socket, state, guard))
}

/// Apply one client frame to its subscription and return the replies.
fn handle_client_text(state: &ServerState, subscription: &mut Subscription, text: &str) -> Vec<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            return vec![ServerMessage::Error {
                message: format!("invalid message: {e}"),
            }]
        }
    };
    match message {
        ClientMessage::Subscribe { chains, pairs } => {
            subscription.subscribe(&chains, &pairs);
            let mut replies = vec![ServerMessage::status(state.limiter.current_count(), subscription)];
            let replay = state
                .cache
                .snapshot(|event| state.filter.allows(event) && subscription.matches(event));
            replies.extend(replay.iter().map(|event| ServerMessage::price(event)));
            replies
        }
        ClientMessage::Unsubscribe { chains, pairs } => {
            subscription.unsubscribe(&chains, &pairs);
            vec![ServerMessage::status(state.limiter.current_count(), subscription)]
        }
        ClientMessage::Ping => vec![ServerMessage::Pong {
            timestamp: state.clock.now_ms(),
        }],
    }
}

async fn handle_client(socket: WebSocket, state: ServerState, _guard: ConnectionGuard) {
    let id = Uuid::new_v4();
    let connections = state.limiter.current_count();
    Metrics::distribution_clients(connections);
    info!(%id, connections, "Distribution client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();
    let mut subscription = Subscription::new();
    let mut ping = interval_at(Instant::now() + state.ping_interval, state.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'session: loop {
        let replies = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_text(&state, &mut subscription, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(%id, error = %e, "Distribution client receive error");
                    break;
                }
            },
            result = events.recv() => match result {
                Ok(event) if subscription.matches(&event) => vec![ServerMessage::price(&event)],
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!(%id, skipped = n, "Distribution client lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        for reply in replies {
            let json = match serde_json::to_string(&reply) {
                Ok(json) => json,
                Err(e) => {
                    warn!(%id, error = %e, "Failed to serialize distribution message");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!(%id, "Distribution client gone");
                break 'session;
            }
        }
    }

    info!(
        %id,
        connections = state.limiter.current_count().saturating_sub(1),
        "Distribution client disconnected"
    );
}
