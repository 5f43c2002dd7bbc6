//! Exchange-feed pricer.
//!
//! Each option is mapped once, at registration, to an exchange instrument
//! name. Options without a listed instrument are recorded as unquotable and
//! never retried. Venue prices are quoted in the underlying, so they are
//! converted through the venue index price and then rescaled to one option
//! token's notional.

use crate::pricer::Pricer;
use crate::registry::OptionRegistry;
use dashmap::DashMap;
use optmaker_core::{Address, Clock, Greeks, OptionContract, QuoteResult};
use optmaker_feed::{instrument_name, InstrumentIndex, Ticker, TickerCache};
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangePricerConfig {
    /// Replace venue top-of-book with `mid * (1 -/+ spread)` when set.
    #[serde(default)]
    pub spread_override: Option<f64>,
}

pub struct ExchangePricer {
    registry: OptionRegistry,
    tickers: Arc<TickerCache>,
    instruments: RwLock<InstrumentIndex>,
    /// Option address to instrument name.
    mapping: DashMap<Address, String>,
    /// Options with no listed instrument, with the name that was tried.
    unquotable: DashMap<Address, String>,
    config: ExchangePricerConfig,
    clock: Arc<dyn Clock>,
}

impl ExchangePricer {
    pub fn new(
        config: ExchangePricerConfig,
        instruments: InstrumentIndex,
        tickers: Arc<TickerCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry: OptionRegistry::new(),
            tickers,
            instruments: RwLock::new(instruments),
            mapping: DashMap::new(),
            unquotable: DashMap::new(),
            config,
            clock,
        }
    }

    /// Merge newly discovered instruments. Only affects options registered
    /// afterwards.
    pub fn extend_instruments(&self, instruments: InstrumentIndex) {
        self.instruments.write().extend(instruments);
    }

    pub fn instrument_for(&self, address: &Address) -> Option<String> {
        self.mapping.get(address).map(|e| e.value().clone())
    }

    /// Every mapped instrument name, for the feed subscription.
    pub fn mapped_instruments(&self) -> Vec<String> {
        self.mapping.iter().map(|e| e.value().clone()).collect()
    }

    pub fn is_unquotable(&self, address: &Address) -> bool {
        self.unquotable.contains_key(address)
    }

    pub fn unquotable_count(&self) -> usize {
        self.unquotable.len()
    }

    fn quote_from_ticker(&self, option: &OptionContract, ticker: &Ticker) -> Option<QuoteResult> {
        let index = ticker.index()?;
        let scale = option.notional_scale() * index;

        let venue_bid = ticker.bid().unwrap_or(0.0);
        let venue_ask = ticker.ask()?;
        let venue_mid = match ticker.mark_price.filter(|m| *m > 0.0) {
            Some(mark) if venue_bid <= 0.0 => mark,
            _ => (venue_bid + venue_ask) / 2.0,
        };

        let mid = venue_mid * scale;
        let (bid, ask) = match self.config.spread_override {
            Some(spread) => ((mid * (1.0 - spread)).max(0.0), mid * (1.0 + spread)),
            None => (venue_bid * scale, venue_ask * scale),
        };

        let greeks = ticker
            .greeks
            .map(|g| {
                Greeks {
                    delta: g.delta,
                    gamma: g.gamma,
                    theta: g.theta,
                    vega: g.vega,
                    rho: g.rho,
                }
                .scaled(option.notional_scale())
            })
            .unwrap_or_default();

        Some(QuoteResult {
            bid,
            ask,
            mid,
            greeks,
            implied_vol: ticker.mark_iv.map(|iv| iv / 100.0).unwrap_or(0.0),
            spot: index,
            time_to_expiry: option.time_to_expiry(self.clock.now_secs()),
        })
    }
}

impl Pricer for ExchangePricer {
    fn name(&self) -> &'static str {
        "exchange"
    }

    fn registry(&self) -> &OptionRegistry {
        &self.registry
    }

    fn register_option(&self, option: OptionContract) -> bool {
        if self.registry.contains(&option.address) {
            return false;
        }
        let address = option.address;
        let name = instrument_name(
            &option.underlying,
            option.expiry,
            option.market_strike(),
            option.kind,
        );
        match name {
            Some(name) if self.instruments.read().contains(&name) => {
                info!(%address, instrument = %name, "Option mapped to exchange instrument");
                self.mapping.insert(address, name);
            }
            Some(name) => {
                warn!(%address, instrument = %name, "No exchange instrument for option, unquotable");
                self.unquotable.insert(address, name);
            }
            None => {
                warn!(%address, expiry = option.expiry, "Option expiry out of range, unquotable");
                self.unquotable.insert(address, String::new());
            }
        }
        self.registry.register(option)
    }

    fn has_price_source(&self, option: &OptionContract) -> bool {
        self.mapping.contains_key(&option.address)
    }

    fn price(&self, address: &Address) -> Option<QuoteResult> {
        let option = self.registry.get(address)?;
        if option.is_expired(self.clock.now_secs()) {
            return None;
        }
        let instrument = self.mapping.get(address)?.value().clone();
        let ticker = self.tickers.get(&instrument)?;
        self.quote_from_ticker(&option, &ticker)
    }
}
