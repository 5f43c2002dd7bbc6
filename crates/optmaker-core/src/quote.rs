//! Computed quote values.

use serde::{Deserialize, Serialize};

/// Option sensitivities.
///
/// Theta is per calendar day, vega per 1% volatility, rho per 1% rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl Greeks {
    /// Scale every sensitivity by a notional factor.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            delta: self.delta * factor,
            gamma: self.gamma * factor,
            theta: self.theta * factor,
            vega: self.vega * factor,
            rho: self.rho * factor,
        }
    }
}

/// Two-sided price for one option token. Recomputed on every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub greeks: Greeks,
    /// Volatility used (model) or observed (exchange), as a fraction.
    pub implied_vol: f64,
    /// Underlying spot price used.
    pub spot: f64,
    /// Time to expiry in years.
    pub time_to_expiry: f64,
}

impl QuoteResult {
    /// Bid-ask spread in basis points of mid. `None` when mid is not positive.
    pub fn spread_bps(&self) -> Option<f64> {
        if self.mid <= 0.0 {
            return None;
        }
        Some((self.ask - self.bid) / self.mid * 10_000.0)
    }

    /// Both sides strictly positive and not crossed.
    pub fn is_two_sided(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.bid <= self.ask
    }
}
