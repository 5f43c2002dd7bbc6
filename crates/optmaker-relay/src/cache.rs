//! Latest book per (chain id, pair).

use crate::event::PriceEvent;
use dashmap::DashMap;
use optmaker_core::Clock;
use std::sync::Arc;

pub const DEFAULT_RELAY_STALENESS_MS: i64 = 60_000;

struct CacheEntry {
    event: Arc<PriceEvent>,
    received_at_ms: i64,
}

/// Written only by the relay; stale entries are never served.
pub struct RelayCache {
    entries: DashMap<(u32, String), CacheEntry>,
    staleness_ms: i64,
    clock: Arc<dyn Clock>,
}

impl RelayCache {
    pub fn new(staleness_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            staleness_ms,
            clock,
        }
    }

    pub fn update(&self, event: Arc<PriceEvent>) {
        self.entries.insert(
            (event.chain_id, event.pair.clone()),
            CacheEntry {
                event,
                received_at_ms: self.clock.now_ms(),
            },
        );
    }

    fn is_fresh(&self, entry: &CacheEntry, now_ms: i64) -> bool {
        now_ms - entry.received_at_ms <= self.staleness_ms
    }

    pub fn get(&self, chain_id: u32, pair: &str) -> Option<Arc<PriceEvent>> {
        let entry = self.entries.get(&(chain_id, pair.to_string()))?;
        self.is_fresh(&entry, self.clock.now_ms())
            .then(|| entry.event.clone())
    }

    /// Fresh entries matching `filter`.
    pub fn snapshot(&self, filter: impl Fn(&PriceEvent) -> bool) -> Vec<Arc<PriceEvent>> {
        let now = self.clock.now_ms();
        self.entries
            .iter()
            .filter(|e| self.is_fresh(e.value(), now) && filter(&e.value().event))
            .map(|e| e.value().event.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
