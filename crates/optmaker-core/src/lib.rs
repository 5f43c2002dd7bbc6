//! Core domain types for the optmaker quoting engine.
//!
//! This crate provides the types shared by every other crate:
//! - `OptionContract`: an on-chain option token and its terms
//! - `QuoteResult`, `Greeks`: computed two-sided prices
//! - Fixed-point amount helpers for on-chain settled quantities
//! - `Clock`: injectable time source for staleness checks

pub mod amount;
pub mod clock;
pub mod error;
pub mod option;
pub mod quote;

pub use amount::{
    decimal_price_to_fixed, option_amount_for_quote, pow10, price_to_fixed, quote_amount_for, Rounding,
    units_to_f64,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use option::{OptionContract, OptionKind, OptionParams, STRIKE_DECIMALS};
pub use quote::{Greeks, QuoteResult};

pub use alloy::primitives::{Address, U256};
