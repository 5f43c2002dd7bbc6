//! Spot price cache.

use dashmap::DashMap;
use optmaker_core::Clock;
use std::sync::Arc;

/// Default spot staleness threshold.
pub const DEFAULT_SPOT_STALENESS_MS: i64 = 5_000;

/// One aggregated spot observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotObservation {
    pub price: f64,
    /// Number of sources that contributed.
    pub sources: usize,
    pub updated_at_ms: i64,
}

/// Spot prices keyed by uppercase underlying symbol. Written only by the
/// spot poller.
pub struct SpotCache {
    prices: DashMap<String, SpotObservation>,
    staleness_ms: i64,
    clock: Arc<dyn Clock>,
}

impl SpotCache {
    pub fn new(staleness_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            prices: DashMap::new(),
            staleness_ms,
            clock,
        }
    }

    /// Store a price. Non-finite or non-positive prices are ignored.
    pub fn update(&self, symbol: &str, price: f64, sources: usize) -> bool {
        if !price.is_finite() || price <= 0.0 {
            return false;
        }
        self.prices.insert(
            symbol.to_uppercase(),
            SpotObservation {
                price,
                sources,
                updated_at_ms: self.clock.now_ms(),
            },
        );
        true
    }

    /// Fresh spot price, or `None` if absent or older than the threshold.
    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.observation(symbol).map(|obs| obs.price)
    }

    /// Fresh observation with metadata.
    pub fn observation(&self, symbol: &str) -> Option<SpotObservation> {
        let obs = *self.prices.get(&symbol.to_uppercase())?;
        let age = self.clock.now_ms() - obs.updated_at_ms;
        (age <= self.staleness_ms).then_some(obs)
    }

    /// Symbols with a fresh price.
    pub fn fresh_symbols(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        self.prices
            .iter()
            .filter(|e| now - e.value().updated_at_ms <= self.staleness_ms)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
