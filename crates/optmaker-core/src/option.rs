//! Option contract definitions.
//!
//! Strikes are normalized to "quote per unit underlying". Put tokens are
//! stored with an inverted strike (underlying per unit quote) so that puts
//! and calls share one representation on-chain. `market_strike()` undoes
//! the inversion for pricing.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Fixed-point precision of strikes reported by option discovery.
pub const STRIKE_DECIMALS: u32 = 18;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Put/call flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    pub fn is_put(&self) -> bool {
        matches!(self, Self::Put)
    }

    /// Single-letter suffix used by exchange instrument names.
    pub fn letter(&self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// Raw option parameters as returned by upstream discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionParams {
    /// Option token address.
    pub address: Address,
    /// Redemption contract address.
    pub redemption: Address,
    /// Underlying symbol (e.g. "ETH").
    pub underlying: String,
    /// Strike in 18-decimal fixed point. Puts arrive pre-inverted.
    pub strike: U256,
    /// Expiration, unix seconds.
    pub expiry: i64,
    pub is_put: bool,
    /// Option token decimals.
    pub decimals: u8,
    /// Collateral token address.
    pub collateral: Address,
}

/// A tradable option token. Immutable after registration.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionContract {
    pub address: Address,
    pub underlying: String,
    /// Stored strike: K for calls, 1/K for puts.
    pub strike: f64,
    /// Expiration, unix seconds.
    pub expiry: i64,
    pub kind: OptionKind,
    pub decimals: u8,
    pub collateral: Address,
}

impl OptionContract {
    /// Build a contract from discovery output.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidStrike` if the fixed-point strike is zero or
    /// cannot be represented.
    pub fn from_params(params: &OptionParams) -> Result<Self> {
        let strike = units_to_strike(params.strike)?;
        Ok(Self {
            address: params.address,
            underlying: params.underlying.to_uppercase(),
            strike,
            expiry: params.expiry,
            kind: if params.is_put {
                OptionKind::Put
            } else {
                OptionKind::Call
            },
            decimals: params.decimals,
            collateral: params.collateral,
        })
    }

    /// Strike in quote per unit underlying, with the put inversion undone.
    pub fn market_strike(&self) -> f64 {
        match self.kind {
            OptionKind::Call => self.strike,
            OptionKind::Put => {
                if self.strike > 0.0 {
                    1.0 / self.strike
                } else {
                    0.0
                }
            }
        }
    }

    /// Underlying units covered by one option token.
    ///
    /// A call token covers one unit of underlying. A put token covers one
    /// unit of quote currency, i.e. `1/K` units of underlying, which is the
    /// stored (inverted) strike.
    pub fn notional_scale(&self) -> f64 {
        match self.kind {
            OptionKind::Call => 1.0,
            OptionKind::Put => self.strike,
        }
    }

    /// Time to expiry in years, floored at zero.
    pub fn time_to_expiry(&self, now_secs: i64) -> f64 {
        ((self.expiry - now_secs) as f64 / SECONDS_PER_YEAR).max(0.0)
    }

    pub fn is_expired(&self, now_secs: i64) -> bool {
        now_secs >= self.expiry
    }
}

impl fmt::Display for OptionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:.0}-{}",
            self.underlying,
            self.expiry,
            self.market_strike(),
            self.kind.letter()
        )
    }
}

fn units_to_strike(raw: U256) -> Result<f64> {
    if raw.is_zero() {
        return Err(CoreError::InvalidStrike("zero strike".to_string()));
    }
    let value = crate::amount::units_to_f64(raw, STRIKE_DECIMALS);
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::InvalidStrike(raw.to_string()));
    }
    Ok(value)
}
