//! Normalized RFQ request and decision types.
//!
//! Leg naming follows the taker: `sell` is what the taker gives the maker,
//! `buy` is what the taker receives from the maker.

use optmaker_core::{Address, U256};
use std::fmt;

/// One side of an RFQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfqLeg {
    pub token: Address,
    /// Requested amount in raw units. `None` on the side the maker fills.
    pub amount: Option<U256>,
    pub decimals: u8,
}

impl RfqLeg {
    /// Amount if present and non-zero.
    pub fn nonzero_amount(&self) -> Option<U256> {
        self.amount.filter(|a| !a.is_zero())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfqRequest {
    pub quote_id: String,
    pub sell: RfqLeg,
    pub buy: RfqLeg,
}

/// Which side of the book the maker quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    /// Maker buys the option (taker sells it).
    Bid,
    /// Maker sells the option (taker buys it).
    Ask,
}

/// Accepted RFQ with fully resolved integer amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteFill {
    pub side: QuoteSide,
    pub option: Address,
    pub option_amount: U256,
    pub quote_token: Address,
    pub quote_amount: U256,
    /// Per-token price in quote units used for the amounts.
    pub price: f64,
}

impl QuoteFill {
    /// Raw amount the taker gives.
    pub fn taker_sell_amount(&self) -> U256 {
        match self.side {
            QuoteSide::Ask => self.quote_amount,
            QuoteSide::Bid => self.option_amount,
        }
    }

    /// Raw amount the taker receives.
    pub fn taker_buy_amount(&self) -> U256 {
        match self.side {
            QuoteSide::Ask => self.option_amount,
            QuoteSide::Bid => self.quote_amount,
        }
    }
}

/// Why an RFQ was declined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineReason {
    /// Both legs are registered options.
    BothLegsOptions,
    /// Neither leg is a registered option.
    NoOptionLeg,
    /// No fresh price for the option.
    NoPrice,
    /// No non-zero amount on either leg, or the resolved amount is zero.
    ZeroAmount,
    /// Amount arithmetic overflowed.
    AmountOverflow,
    /// A configured signing key failed to sign.
    SigningFailed,
    /// Malformed or unsupported request.
    InvalidRequest(String),
}

impl DeclineReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BothLegsOptions => "both_legs_options",
            Self::NoOptionLeg => "no_option_leg",
            Self::NoPrice => "no_price",
            Self::ZeroAmount => "zero_amount",
            Self::AmountOverflow => "amount_overflow",
            Self::SigningFailed => "signing_failed",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothLegsOptions => write!(f, "both legs are options"),
            Self::NoOptionLeg => write!(f, "no supported option in request"),
            Self::NoPrice => write!(f, "no price available"),
            Self::ZeroAmount => write!(f, "zero amount"),
            Self::AmountOverflow => write!(f, "amount overflow"),
            Self::SigningFailed => write!(f, "signing failed"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RfqDecision {
    Quote(QuoteFill),
    Decline(DeclineReason),
}

impl RfqDecision {
    pub fn is_quote(&self) -> bool {
        matches!(self, Self::Quote(_))
    }
}
