//! Top-of-book duplicate suppression.

use crate::event::PriceEvent;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct LastSent {
    best_bid: Option<f64>,
    best_ask: Option<f64>,
    touched_at_ms: i64,
}

/// Last forwarded (best bid, best ask) per (chain id, pair).
#[derive(Default)]
pub struct Deduplicator {
    last: DashMap<(u32, String), LastSent>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the event changes the top of book for its key, in which case
    /// it is recorded as the last sent.
    pub fn should_forward(&self, event: &PriceEvent, now_ms: i64) -> bool {
        let best_bid = event.best_bid();
        let best_ask = event.best_ask();
        let next = LastSent {
            best_bid,
            best_ask,
            touched_at_ms: now_ms,
        };
        match self.last.entry((event.chain_id, event.pair.clone())) {
            Entry::Vacant(slot) => {
                slot.insert(next);
                true
            }
            Entry::Occupied(mut slot) => {
                let last = slot.get_mut();
                let changed = last.best_bid != best_bid || last.best_ask != best_ask;
                *last = next;
                changed
            }
        }
    }

    /// Drop keys untouched for longer than `retention_ms`. Returns how many
    /// were removed.
    pub fn cleanup(&self, now_ms: i64, retention_ms: i64) -> usize {
        let before = self.last.len();
        self.last.retain(|_, v| now_ms - v.touched_at_ms <= retention_ms);
        before - self.last.len()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
