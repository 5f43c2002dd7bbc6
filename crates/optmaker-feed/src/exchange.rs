//! Streaming options exchange feed.
//!
//! JSON-RPC over WebSocket: subscribes to `ticker.{instrument}.100ms`
//! channels and writes every notification into the `TickerCache`.
//! Subscriptions are replayed on every (re)connect.

use crate::error::{FeedError, FeedResult};
use crate::ticker::{Ticker, TickerCache};
use optmaker_ws::{ConnectionConfig, ConnectionManager, WsEvent, WsWriteHandle};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Channels per subscribe request.
const SUBSCRIBE_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct ExchangeFeedConfig {
    pub ws_url: String,
    pub heartbeat_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for ExchangeFeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://www.deribit.com/ws/api/v2".to_string(),
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 300_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    method: Option<String>,
    params: Option<NotificationParams>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    channel: String,
    data: Ticker,
}

/// Parse one inbound frame. `Ok(None)` for frames that are not ticker
/// notifications (subscribe acks, heartbeats).
pub fn parse_ticker_notification(text: &str) -> FeedResult<Option<Ticker>> {
    let msg: Notification = serde_json::from_str(text)?;
    if let Some(err) = msg.error {
        return Err(FeedError::ParseError(format!("exchange error: {err}")));
    }
    match (msg.method.as_deref(), msg.params) {
        (Some("subscription"), Some(params)) if params.channel.starts_with("ticker.") => {
            Ok(Some(params.data))
        }
        _ => Ok(None),
    }
}

pub fn ticker_channel(instrument: &str) -> String {
    format!("ticker.{instrument}.100ms")
}

pub struct ExchangeFeed {
    cache: Arc<TickerCache>,
    manager: Arc<ConnectionManager>,
    write: WsWriteHandle,
    events: TokioMutex<Option<mpsc::Receiver<WsEvent>>>,
    instruments: RwLock<BTreeSet<String>>,
    next_id: AtomicU64,
}

impl ExchangeFeed {
    pub fn new(config: ExchangeFeedConfig, cache: Arc<TickerCache>, shutdown: CancellationToken) -> Self {
        let (event_tx, event_rx) = mpsc::channel(4096);
        let ws_config = ConnectionConfig {
            name: "exchange".to_string(),
            url: config.ws_url,
            reconnect_base_delay_ms: config.reconnect_base_delay_ms,
            reconnect_max_delay_ms: config.reconnect_max_delay_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            ..Default::default()
        };
        let manager = ConnectionManager::new(ws_config, event_tx).with_shutdown_token(shutdown);
        let write = manager.write_handle();
        Self {
            cache,
            manager: Arc::new(manager),
            write,
            events: TokioMutex::new(Some(event_rx)),
            instruments: RwLock::new(BTreeSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn cache(&self) -> &Arc<TickerCache> {
        &self.cache
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn subscribed_count(&self) -> usize {
        self.instruments.read().len()
    }

    /// Add instruments to the subscription set. Sent immediately when
    /// connected, otherwise on the next connect.
    pub async fn subscribe(&self, instruments: impl IntoIterator<Item = String>) {
        let added: Vec<String> = {
            let mut set = self.instruments.write();
            instruments
                .into_iter()
                .filter(|name| set.insert(name.clone()))
                .collect()
        };
        if !added.is_empty() && self.write.is_connected() {
            self.send_subscribe(&added).await;
        }
    }

    fn subscribe_request(&self, instruments: &[String]) -> String {
        let channels: Vec<String> = instruments.iter().map(|i| ticker_channel(i)).collect();
        json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "public/subscribe",
            "params": { "channels": channels },
        })
        .to_string()
    }

    async fn send_subscribe(&self, instruments: &[String]) {
        for batch in instruments.chunks(SUBSCRIBE_BATCH) {
            let request = self.subscribe_request(batch);
            if let Err(e) = self.write.send_text(request).await {
                warn!(error = %e, "Failed to send exchange subscription");
                return;
            }
        }
        info!(count = instruments.len(), "Exchange ticker subscriptions sent");
    }

    async fn handle_event(&self, event: WsEvent) {
        match event {
            WsEvent::Connected => {
                let all: Vec<String> = self.instruments.read().iter().cloned().collect();
                if !all.is_empty() {
                    self.send_subscribe(&all).await;
                }
            }
            WsEvent::Text(text) => match parse_ticker_notification(&text) {
                Ok(Some(ticker)) => self.cache.update(ticker),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Ignoring exchange frame"),
            },
            WsEvent::Binary(_) => {}
            WsEvent::Disconnected => warn!("Exchange feed disconnected"),
        }
    }

    /// Connect and process frames until shutdown.
    ///
    /// # Errors
    /// Fails if the initial connection fails, or if called twice.
    pub async fn run(&self) -> FeedResult<()> {
        let mut events = self.events.lock().await.take().ok_or(FeedError::AlreadyRunning)?;
        let connect = self.manager.connect();
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return result.map_err(FeedError::from),
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker_notification() {
        let text = r#"{"jsonrpc":"2.0","method":"subscription","params":{
            "channel":"ticker.ETH-28MAR25-3000-C.100ms",
            "data":{"instrument_name":"ETH-28MAR25-3000-C","best_bid_price":0.105,
                "best_ask_price":0.11,"best_bid_amount":25.0,"best_ask_amount":30.0,
                "mark_price":0.1075,"mark_iv":78.5,"index_price":3100.2,
                "underlying_price":3102.0,"timestamp":1700000000000,
                "greeks":{"delta":0.62,"gamma":0.0004,"theta":-6.1,"vega":3.2,"rho":1.1},
                "stats":{"volume":10.0}}}}"#;
        let ticker = parse_ticker_notification(text).unwrap().unwrap();
        assert_eq!(ticker.instrument_name, "ETH-28MAR25-3000-C");
        assert_eq!(ticker.bid(), Some(0.105));
        assert_eq!(ticker.mark_iv, Some(78.5));
        assert_eq!(ticker.greeks.unwrap().delta, 0.62);
    }

    #[test]
    fn test_parse_ignores_acks() {
        let ack = r#"{"jsonrpc":"2.0","id":1,"result":["ticker.ETH-28MAR25-3000-C.100ms"]}"#;
        assert!(parse_ticker_notification(ack).unwrap().is_none());
    }

    #[test]
    fn test_parse_error_frame() {
        let err = r#"{"jsonrpc":"2.0","id":2,"error":{"code":10001,"message":"bad"}}"#;
        assert!(parse_ticker_notification(err).is_err());
    }

    #[test]
    fn test_subscribe_request_shape() {
        let feed = ExchangeFeed::new(
            ExchangeFeedConfig::default(),
            Arc::new(TickerCache::new(60_000, Arc::new(optmaker_core::SystemClock))),
            CancellationToken::new(),
        );
        let req: serde_json::Value =
            serde_json::from_str(&feed.subscribe_request(&["ETH-28MAR25-3000-C".to_string()])).unwrap();
        assert_eq!(req["method"], "public/subscribe");
        assert_eq!(req["params"]["channels"][0], "ticker.ETH-28MAR25-3000-C.100ms");
    }
}
