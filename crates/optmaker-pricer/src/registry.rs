//! Registered option tokens.

use dashmap::DashMap;
use optmaker_core::{Address, OptionContract};
use std::sync::Arc;

/// Options keyed by token address. Entries are never mutated or removed
/// once registered.
#[derive(Default)]
pub struct OptionRegistry {
    options: DashMap<Address, Arc<OptionContract>>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an option. Returns `false` if the address is already known;
    /// the existing entry is kept.
    pub fn register(&self, option: OptionContract) -> bool {
        let mut inserted = false;
        self.options.entry(option.address).or_insert_with(|| {
            inserted = true;
            Arc::new(option)
        });
        inserted
    }

    pub fn get(&self, address: &Address) -> Option<Arc<OptionContract>> {
        self.options.get(address).map(|e| e.value().clone())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.options.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Snapshot of every registered option.
    pub fn all(&self) -> Vec<Arc<OptionContract>> {
        self.options.iter().map(|e| e.value().clone()).collect()
    }
}
