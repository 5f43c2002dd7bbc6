//! Decoded market-data events.

use optmaker_core::Address;
use serde::Serialize;

/// Price level, serialized as `[price, size]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Level(pub f64, pub f64);

impl Level {
    pub fn price(&self) -> f64 {
        self.0
    }

    pub fn size(&self) -> f64 {
        self.1
    }

    /// Pairs up a flat `[price, size, ...]` array. A trailing odd value is
    /// dropped.
    pub fn from_flat(flat: &[f32]) -> Vec<Level> {
        flat.chunks_exact(2)
            .map(|c| Level(f64::from(c[0]), f64::from(c[1])))
            .collect()
    }
}

/// Cache and dedup key for a pair: lowercase `0x` hex addresses joined by `/`.
pub fn pair_key(base: &Address, quote: &Address) -> String {
    format!("0x{}/0x{}", hex::encode(base), hex::encode(quote))
}

/// One pair update from one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceEvent {
    pub chain_id: u32,
    pub base: Address,
    pub quote: Address,
    /// `pair_key(base, quote)`.
    pub pair: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    /// Venue timestamp (ms).
    pub timestamp: u64,
}

impl PriceEvent {
    pub fn new(chain_id: u32, base: Address, quote: Address, bids: Vec<Level>, asks: Vec<Level>, timestamp: u64) -> Self {
        Self {
            chain_id,
            pair: pair_key(&base, &quote),
            base,
            quote,
            bids,
            asks,
            timestamp,
        }
    }

    /// Highest bid. Venues do not all send levels sorted.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.iter().map(Level::price).reduce(f64::max)
    }

    /// Lowest ask.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.iter().map(Level::price).reduce(f64::min)
    }

    pub fn involves(&self, token: &Address) -> bool {
        self.base == *token || self.quote == *token
    }
}
