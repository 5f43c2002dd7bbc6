//! Continuous price broadcast.
//!
//! While the connection is open, the full quote book is pushed as one
//! protobuf frame every `interval_ms`, the first one `initial_delay_ms` after
//! the session opens. Options without a usable two-sided price are left out.

use crate::proto::{LevelInfo, LevelsSchema};
use optmaker_core::Address;
use optmaker_pricer::Pricer;
use optmaker_telemetry::Metrics;
use optmaker_ws::{WsResult, WsWriteHandle};
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const MSG_TOPIC: &str = "pricing";
const MSG_TYPE: &str = "levels";
/// Granularity of the open/closed check.
const CHECK_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub chain_id: u32,
    pub maker_id: String,
    pub interval_ms: u64,
    pub initial_delay_ms: u64,
    /// Options quoted wider than this (bps of mid) are skipped.
    pub max_spread_bps: f64,
    /// Token the levels are priced in.
    pub quote_token: Address,
    pub quote_decimals: u8,
    /// Size advertised on each level, in option tokens.
    pub level_size: f64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            maker_id: String::new(),
            interval_ms: 10_000,
            initial_delay_ms: 1_000,
            max_spread_bps: 500.0,
            quote_token: Address::ZERO,
            quote_decimals: 6,
            level_size: 1.0,
        }
    }
}

/// Snapshot of every broadcastable option.
pub fn build_levels(pricer: &dyn Pricer, config: &BroadcastConfig) -> LevelsSchema {
    let mut levels = Vec::new();
    for option in pricer.registry().all() {
        let Some(quote) = pricer.price(&option.address) else {
            Metrics::broadcast_skipped("no_price");
            continue;
        };
        if quote.bid <= 0.0 || quote.ask <= 0.0 {
            Metrics::broadcast_skipped("non_positive");
            continue;
        }
        match quote.spread_bps() {
            Some(bps) if bps <= config.max_spread_bps => {}
            spread => {
                trace!(address = %option.address, spread_bps = ?spread, "Spread too wide to broadcast");
                Metrics::broadcast_skipped("wide_spread");
                continue;
            }
        }
        let size = config.level_size as f32;
        levels.push(LevelInfo {
            base_address: option.address.to_vec(),
            base_decimals: option.decimals.into(),
            quote_address: config.quote_token.to_vec(),
            quote_decimals: config.quote_decimals.into(),
            bids: vec![quote.bid as f32, size],
            asks: vec![quote.ask as f32, size],
        });
    }

    LevelsSchema {
        chain_id: config.chain_id,
        msg_topic: MSG_TOPIC.to_string(),
        msg_type: MSG_TYPE.to_string(),
        levels,
        maker_id: config.maker_id.clone(),
    }
}

pub struct PriceBroadcaster {
    config: BroadcastConfig,
    pricer: Arc<dyn Pricer>,
    write: WsWriteHandle,
}

impl PriceBroadcaster {
    pub fn new(config: BroadcastConfig, pricer: Arc<dyn Pricer>, write: WsWriteHandle) -> Self {
        Self {
            config,
            pricer,
            write,
        }
    }

    /// Build and send one frame. Returns the number of levels sent; nothing
    /// is sent when no option survives or the connection is closed.
    pub async fn broadcast_once(&self) -> WsResult<usize> {
        if !self.write.is_connected() {
            return Ok(0);
        }
        let schema = build_levels(self.pricer.as_ref(), &self.config);
        let count = schema.levels.len();
        if count == 0 {
            debug!("No broadcastable prices");
            return Ok(0);
        }
        self.write.send_binary(schema.encode_to_vec()).await?;
        Metrics::broadcast_sent(count);
        debug!(levels = count, "Price levels broadcast");
        Ok(count)
    }

    /// Broadcast while the connection is open, until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let initial_delay = Duration::from_millis(self.config.initial_delay_ms);
        let period = Duration::from_millis(self.config.interval_ms);
        let mut check = interval(Duration::from_millis(CHECK_INTERVAL_MS));
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_send: Option<Instant> = None;

        info!(interval_ms = self.config.interval_ms, "Price broadcaster started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = check.tick() => {}
            }
            if !self.write.is_connected() {
                next_send = None;
                continue;
            }
            let now = Instant::now();
            let due = *next_send.get_or_insert(now + initial_delay);
            if now < due {
                continue;
            }
            if let Err(e) = self.broadcast_once().await {
                warn!(error = %e, "Price broadcast failed");
            }
            next_send = Some(now + period);
        }
        info!("Price broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optmaker_core::{Greeks, OptionContract, OptionKind, QuoteResult};
    use optmaker_pricer::OptionRegistry;
    use optmaker_ws::{ConnectionState, WsOutbound};
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct BookPricer {
        registry: OptionRegistry,
        book: HashMap<Address, (f64, f64)>,
    }

    impl Pricer for BookPricer {
        fn name(&self) -> &'static str {
            "book"
        }
        fn registry(&self) -> &OptionRegistry {
            &self.registry
        }
        fn register_option(&self, option: OptionContract) -> bool {
            self.registry.register(option)
        }
        fn has_price_source(&self, option: &OptionContract) -> bool {
            self.book.contains_key(&option.address)
        }
        fn price(&self, address: &Address) -> Option<QuoteResult> {
            self.book.get(address).map(|&(bid, ask)| QuoteResult {
                bid,
                ask,
                mid: (bid + ask) / 2.0,
                greeks: Greeks::default(),
                implied_vol: 0.8,
                spot: 3000.0,
                time_to_expiry: 0.1,
            })
        }
    }

    fn option(byte: u8) -> OptionContract {
        OptionContract {
            address: Address::repeat_byte(byte),
            underlying: "ETH".to_string(),
            strike: 3000.0,
            expiry: 1_900_000_000,
            kind: OptionKind::Call,
            decimals: 18,
            collateral: Address::repeat_byte(0xcc),
        }
    }

    /// 1: tight, 2: zero bid, 3: 10% wide, 4: unpriced.
    fn pricer() -> Arc<dyn Pricer> {
        let mut book = HashMap::new();
        book.insert(Address::repeat_byte(1), (100.0, 102.0));
        book.insert(Address::repeat_byte(2), (0.0, 5.0));
        book.insert(Address::repeat_byte(3), (95.0, 105.0));
        let pricer = BookPricer {
            registry: OptionRegistry::new(),
            book,
        };
        for byte in 1..=4 {
            pricer.register_option(option(byte));
        }
        Arc::new(pricer)
    }

    fn config() -> BroadcastConfig {
        BroadcastConfig {
            chain_id: 42161,
            maker_id: "maker-1".to_string(),
            quote_token: Address::repeat_byte(0x05),
            ..Default::default()
        }
    }

    fn handle(state: ConnectionState) -> (WsWriteHandle, mpsc::Receiver<WsOutbound>, Arc<RwLock<ConnectionState>>) {
        let (tx, rx) = mpsc::channel(16);
        let state = Arc::new(RwLock::new(state));
        (WsWriteHandle::new(tx, state.clone()), rx, state)
    }

    #[test]
    fn test_build_levels_filters() {
        let schema = build_levels(pricer().as_ref(), &config());
        assert_eq!(schema.chain_id, 42161);
        assert_eq!(schema.maker_id, "maker-1");
        assert_eq!(schema.levels.len(), 1);
        let level = &schema.levels[0];
        assert_eq!(level.base_address, vec![1u8; 20]);
        assert_eq!(level.quote_address, vec![5u8; 20]);
        assert_eq!(level.base_decimals, 18);
        assert_eq!(level.quote_decimals, 6);
        assert_eq!(level.bids, vec![100.0, 1.0]);
        assert_eq!(level.asks, vec![102.0, 1.0]);
    }

    #[tokio::test]
    async fn test_broadcast_once_sends_one_frame() {
        let (write, mut rx, _state) = handle(ConnectionState::Connected);
        let broadcaster = PriceBroadcaster::new(config(), pricer(), write);
        assert_eq!(broadcaster.broadcast_once().await.unwrap(), 1);

        let Some(WsOutbound::Binary(bytes)) = rx.recv().await else {
            panic!("expected binary frame");
        };
        let decoded = LevelsSchema::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.msg_topic, "pricing");
        assert_eq!(decoded.levels.len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_sent_when_empty_or_closed() {
        let empty: Arc<dyn Pricer> = Arc::new(BookPricer {
            registry: OptionRegistry::new(),
            book: HashMap::new(),
        });
        let (write, mut rx, _state) = handle(ConnectionState::Connected);
        let broadcaster = PriceBroadcaster::new(config(), empty, write);
        assert_eq!(broadcaster.broadcast_once().await.unwrap(), 0);
        assert!(rx.try_recv().is_err());

        let (write, mut rx, _state) = handle(ConnectionState::Disconnected);
        let broadcaster = PriceBroadcaster::new(config(), pricer(), write);
        assert_eq!(broadcaster.broadcast_once().await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_follows_connection() {
        let (write, mut rx, state) = handle(ConnectionState::Disconnected);
        let broadcaster = Arc::new(PriceBroadcaster::new(config(), pricer(), write));
        let shutdown = CancellationToken::new();
        let task = {
            let broadcaster = broadcaster.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { broadcaster.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());

        *state.write() = ConnectionState::Connected;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(rx.try_recv().is_err(), "sent before initial delay");
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(rx.try_recv().is_ok(), "first frame after ~1s");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_ok(), "second frame after interval");

        shutdown.cancel();
        task.await.unwrap();
    }
}
