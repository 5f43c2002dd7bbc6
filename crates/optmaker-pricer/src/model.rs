//! Model-based pricer.
//!
//! Black-Scholes on the cached spot price. The spread is symmetric around
//! mid, `max(spread_pct * mid, min_spread / 2)` on each side, with the bid
//! floored at zero.

use crate::error::{PricerError, PricerResult};
use crate::pricer::Pricer;
use crate::registry::OptionRegistry;
use optmaker_core::{Address, Clock, OptionContract, QuoteResult};
use optmaker_feed::SpotCache;
use optmaker_pricing::{greeks, price, BsInputs};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelPricerConfig {
    /// Annualized volatility used when no per-underlying value is set.
    pub default_volatility: f64,
    /// Per-underlying volatility overrides (uppercase symbol).
    #[serde(default)]
    pub volatilities: HashMap<String, f64>,
    pub risk_free_rate: f64,
    /// Half-spread as a fraction of mid.
    pub spread_pct: f64,
    /// Minimum full spread per option token, in quote units.
    pub min_spread: f64,
}

impl Default for ModelPricerConfig {
    fn default() -> Self {
        Self {
            default_volatility: 0.8,
            volatilities: HashMap::new(),
            risk_free_rate: 0.05,
            spread_pct: 0.02,
            min_spread: 1.0,
        }
    }
}

impl ModelPricerConfig {
    pub fn validate(&self) -> PricerResult<()> {
        let vols = std::iter::once(self.default_volatility).chain(self.volatilities.values().copied());
        for vol in vols {
            if !vol.is_finite() || vol < 0.0 {
                return Err(PricerError::InvalidConfig(format!("volatility {vol}")));
            }
        }
        if !self.spread_pct.is_finite() || self.spread_pct < 0.0 {
            return Err(PricerError::InvalidConfig(format!("spread_pct {}", self.spread_pct)));
        }
        if !self.min_spread.is_finite() || self.min_spread < 0.0 {
            return Err(PricerError::InvalidConfig(format!("min_spread {}", self.min_spread)));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PricerError::InvalidConfig("risk_free_rate".to_string()));
        }
        Ok(())
    }

    fn volatility_for(&self, underlying: &str) -> f64 {
        self.volatilities
            .get(underlying)
            .copied()
            .unwrap_or(self.default_volatility)
    }
}

/// Symmetric spread around `mid`. Returns `(bid, ask)` with
/// `ask - bid >= min_spread` and `bid >= 0`.
pub fn apply_spread(mid: f64, spread_pct: f64, min_spread: f64) -> (f64, f64) {
    let half = (spread_pct * mid).max(min_spread / 2.0);
    let bid = (mid - half).max(0.0);
    let ask = (mid + half).max(bid + min_spread);
    (bid, ask)
}

pub struct ModelPricer {
    registry: OptionRegistry,
    spot: Arc<SpotCache>,
    /// Underlyings the spot poller covers.
    spot_symbols: HashSet<String>,
    config: ModelPricerConfig,
    clock: Arc<dyn Clock>,
}

impl ModelPricer {
    pub fn new(
        config: ModelPricerConfig,
        spot: Arc<SpotCache>,
        spot_symbols: impl IntoIterator<Item = String>,
        clock: Arc<dyn Clock>,
    ) -> PricerResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: OptionRegistry::new(),
            spot,
            spot_symbols: spot_symbols.into_iter().map(|s| s.to_uppercase()).collect(),
            config,
            clock,
        })
    }
}

impl Pricer for ModelPricer {
    fn name(&self) -> &'static str {
        "model"
    }

    fn registry(&self) -> &OptionRegistry {
        &self.registry
    }

    fn register_option(&self, option: OptionContract) -> bool {
        info!(
            address = %option.address,
            option = %option,
            "Registering option with model pricer"
        );
        self.registry.register(option)
    }

    fn has_price_source(&self, option: &OptionContract) -> bool {
        self.spot_symbols.contains(&option.underlying)
    }

    fn price(&self, address: &Address) -> Option<QuoteResult> {
        let option = self.registry.get(address)?;
        let now = self.clock.now_secs();
        if option.is_expired(now) {
            return None;
        }
        let spot = self.spot.get(&option.underlying)?;

        let vol = self.config.volatility_for(&option.underlying);
        let time = option.time_to_expiry(now);
        let inputs = BsInputs::new(
            spot,
            option.market_strike(),
            time,
            self.config.risk_free_rate,
            vol,
        );
        let scale = option.notional_scale();
        let mid = price(option.kind, &inputs) * scale;
        let (bid, ask) = apply_spread(mid, self.config.spread_pct, self.config.min_spread);

        Some(QuoteResult {
            bid,
            ask,
            mid,
            greeks: greeks(option.kind, &inputs).scaled(scale),
            implied_vol: vol,
            spot,
            time_to_expiry: time,
        })
    }
}
