//! Exchange ticker cache.
//!
//! One entry per instrument, written by the exchange feed only. Readers get
//! `None` once an entry is older than the staleness threshold. Every update
//! is also published to observers over a broadcast channel; dropping the
//! receiver unsubscribes.

use dashmap::DashMap;
use optmaker_core::Clock;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default exchange staleness threshold.
pub const DEFAULT_TICKER_STALENESS_MS: i64 = 60_000;

const OBSERVER_CAPACITY: usize = 1024;

/// Venue Greeks as reported (per one underlying unit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct TickerGreeks {
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub theta: f64,
    #[serde(default)]
    pub vega: f64,
    #[serde(default)]
    pub rho: f64,
}

/// Ticker snapshot. Prices are in underlying units (coin-margined venue).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ticker {
    pub instrument_name: String,
    #[serde(default)]
    pub best_bid_price: Option<f64>,
    #[serde(default)]
    pub best_ask_price: Option<f64>,
    #[serde(default)]
    pub best_bid_amount: Option<f64>,
    #[serde(default)]
    pub best_ask_amount: Option<f64>,
    #[serde(default)]
    pub mark_price: Option<f64>,
    /// Mark implied volatility in percent.
    #[serde(default)]
    pub mark_iv: Option<f64>,
    #[serde(default)]
    pub index_price: Option<f64>,
    #[serde(default)]
    pub underlying_price: Option<f64>,
    #[serde(default)]
    pub greeks: Option<TickerGreeks>,
    /// Venue timestamp, unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Ticker {
    /// Best bid if strictly positive.
    pub fn bid(&self) -> Option<f64> {
        self.best_bid_price.filter(|p| *p > 0.0)
    }

    /// Best ask if strictly positive.
    pub fn ask(&self) -> Option<f64> {
        self.best_ask_price.filter(|p| *p > 0.0)
    }

    pub fn index(&self) -> Option<f64> {
        self.index_price.filter(|p| *p > 0.0)
    }
}

#[derive(Debug, Clone)]
struct TickerEntry {
    ticker: Ticker,
    received_at_ms: i64,
}

pub struct TickerCache {
    entries: DashMap<String, TickerEntry>,
    staleness_ms: i64,
    clock: Arc<dyn Clock>,
    updates: broadcast::Sender<Arc<Ticker>>,
}

impl TickerCache {
    pub fn new(staleness_ms: i64, clock: Arc<dyn Clock>) -> Self {
        let (updates, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            entries: DashMap::new(),
            staleness_ms,
            clock,
            updates,
        }
    }

    pub fn update(&self, ticker: Ticker) {
        let shared = Arc::new(ticker.clone());
        self.entries.insert(
            ticker.instrument_name.clone(),
            TickerEntry {
                ticker,
                received_at_ms: self.clock.now_ms(),
            },
        );
        // no observers is fine
        let _ = self.updates.send(shared);
    }

    /// Fresh ticker, or `None` if absent or stale.
    pub fn get(&self, instrument: &str) -> Option<Ticker> {
        let entry = self.entries.get(instrument)?;
        let age = self.clock.now_ms() - entry.received_at_ms;
        (age <= self.staleness_ms).then(|| entry.ticker.clone())
    }

    /// Observe every update.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Ticker>> {
        self.updates.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.updates.receiver_count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optmaker_core::ManualClock;

    fn ticker(name: &str, bid: f64, ask: f64) -> Ticker {
        Ticker {
            instrument_name: name.to_string(),
            best_bid_price: Some(bid),
            best_ask_price: Some(ask),
            best_bid_amount: Some(10.0),
            best_ask_amount: Some(12.0),
            mark_price: Some((bid + ask) / 2.0),
            mark_iv: Some(80.0),
            index_price: Some(3100.0),
            underlying_price: Some(3101.0),
            greeks: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_staleness_boundary() {
        let clock = ManualClock::new(0);
        let cache = TickerCache::new(DEFAULT_TICKER_STALENESS_MS, Arc::new(clock.clone()));
        cache.update(ticker("ETH-28MAR25-3000-C", 0.1, 0.11));

        clock.advance(DEFAULT_TICKER_STALENESS_MS - 1);
        assert!(cache.get("ETH-28MAR25-3000-C").is_some());
        clock.advance(2);
        assert!(cache.get("ETH-28MAR25-3000-C").is_none());
    }

    #[test]
    fn test_zero_bid_is_absent() {
        let t = ticker("X", 0.0, 0.11);
        assert_eq!(t.bid(), None);
        assert_eq!(t.ask(), Some(0.11));
    }

    #[tokio::test]
    async fn test_observers_receive_updates_and_unsubscribe_on_drop() {
        let cache = TickerCache::new(DEFAULT_TICKER_STALENESS_MS, Arc::new(ManualClock::new(0)));
        let mut rx = cache.subscribe();
        assert_eq!(cache.observer_count(), 1);

        cache.update(ticker("ETH-28MAR25-3000-C", 0.1, 0.11));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.instrument_name, "ETH-28MAR25-3000-C");

        drop(rx);
        assert_eq!(cache.observer_count(), 0);
        cache.update(ticker("ETH-28MAR25-3000-C", 0.1, 0.12));
    }
}
