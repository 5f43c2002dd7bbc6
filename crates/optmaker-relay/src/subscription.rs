//! Per-client subscription filter.

use crate::event::PriceEvent;
use std::collections::BTreeSet;

/// Chains and pairs one client wants. Inactive until the first subscribe.
///
/// Each dimension is either an explicit allow-set or, when the set is empty
/// inside an active subscription, a wildcard. A wildcard remembers the
/// entries removed from it so that unsubscribing from "all" takes effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subscription {
    active: bool,
    chains: BTreeSet<u32>,
    pairs: BTreeSet<String>,
    excluded_chains: BTreeSet<u32>,
    excluded_pairs: BTreeSet<String>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn chains(&self) -> impl Iterator<Item = u32> + '_ {
        self.chains.iter().copied()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(String::as_str)
    }

    fn chains_wildcard(&self) -> bool {
        self.active && self.chains.is_empty()
    }

    fn pairs_wildcard(&self) -> bool {
        self.active && self.pairs.is_empty()
    }

    /// Widen the subscription. No chains and no pairs subscribes to
    /// everything. A dimension that is already a wildcard stays one; naming
    /// a previously excluded entry lifts the exclusion.
    pub fn subscribe(&mut self, chains: &[u32], pairs: &[String]) {
        if chains.is_empty() && pairs.is_empty() {
            *self = Self {
                active: true,
                ..Self::default()
            };
            return;
        }
        let chains_wildcard = self.chains_wildcard();
        let pairs_wildcard = self.pairs_wildcard();
        for chain in chains {
            self.excluded_chains.remove(chain);
            if !chains_wildcard {
                self.chains.insert(*chain);
            }
        }
        for pair in pairs {
            let pair = pair.to_lowercase();
            self.excluded_pairs.remove(&pair);
            if !pairs_wildcard {
                self.pairs.insert(pair);
            }
        }
        self.active = true;
    }

    /// Narrow the subscription. No chains and no pairs unsubscribes entirely,
    /// as does removing the last entry of an allow-set, so that removal never
    /// widens the filter back to "all". Removing from a wildcard excludes
    /// the entry.
    pub fn unsubscribe(&mut self, chains: &[u32], pairs: &[String]) {
        if chains.is_empty() && pairs.is_empty() {
            *self = Self::default();
            return;
        }
        let had_chains = !self.chains.is_empty();
        let had_pairs = !self.pairs.is_empty();
        for chain in chains {
            if had_chains {
                self.chains.remove(chain);
            } else {
                self.excluded_chains.insert(*chain);
            }
        }
        for pair in pairs {
            let pair = pair.to_lowercase();
            if had_pairs {
                self.pairs.remove(&pair);
            } else {
                self.excluded_pairs.insert(pair);
            }
        }
        if (had_chains && self.chains.is_empty()) || (had_pairs && self.pairs.is_empty()) {
            *self = Self::default();
        }
    }

    pub fn matches(&self, event: &PriceEvent) -> bool {
        let chain_ok = if self.chains.is_empty() {
            !self.excluded_chains.contains(&event.chain_id)
        } else {
            self.chains.contains(&event.chain_id)
        };
        let pair_ok = if self.pairs.is_empty() {
            !self.excluded_pairs.contains(&event.pair)
        } else {
            self.pairs.contains(&event.pair)
        };
        self.active && chain_ok && pair_ok
    }
}
