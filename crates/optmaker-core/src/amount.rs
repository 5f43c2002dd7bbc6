//! Fixed-point amount conversion.
//!
//! Settled token amounts are integers. Prices are converted to a fixed-point
//! integer at the quote token's precision through `rust_decimal` before any
//! multiplication, so no settled amount ever passes through `f64`.

use alloy::primitives::U256;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// `10^decimals` as a `U256`.
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

fn decimal_pow10(decimals: u8) -> Option<Decimal> {
    let mut value = Decimal::ONE;
    for _ in 0..decimals {
        value = value.checked_mul(Decimal::TEN)?;
    }
    Some(value)
}

/// Convert a raw integer amount to a human-scale float. Display only.
pub fn units_to_f64(raw: U256, decimals: u32) -> f64 {
    let value: f64 = raw.to_string().parse().unwrap_or(0.0);
    value / 10f64.powi(decimals as i32)
}

/// Convert a decimal price to a fixed-point integer with `decimals` digits.
///
/// Truncates toward zero. Returns `None` for negative prices or overflow.
pub fn decimal_price_to_fixed(price: Decimal, decimals: u8) -> Option<U256> {
    if price.is_sign_negative() {
        return None;
    }
    let scaled = price.checked_mul(decimal_pow10(decimals)?)?.trunc();
    scaled.to_u128().map(U256::from)
}

/// Convert a float price to a fixed-point integer with `decimals` digits.
pub fn price_to_fixed(price: f64, decimals: u8) -> Option<U256> {
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    decimal_price_to_fixed(Decimal::from_f64(price)?, decimals)
}

/// Direction a derived amount is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

impl Rounding {
    fn reverse(self) -> Self {
        match self {
            Self::Down => Self::Up,
            Self::Up => Self::Down,
        }
    }
}

fn scale_price(price: f64, decimals: u8, rounding: Rounding) -> Option<U256> {
    if !price.is_finite() || price < 0.0 {
        return None;
    }
    let scaled = Decimal::from_f64(price)?.checked_mul(decimal_pow10(decimals)?)?;
    let scaled = match rounding {
        Rounding::Down => scaled.trunc(),
        Rounding::Up => scaled.ceil(),
    };
    scaled.to_u128().map(U256::from)
}

fn div_rounded(numerator: U256, denominator: U256, rounding: Rounding) -> U256 {
    let quotient = numerator / denominator;
    if rounding == Rounding::Up && !(numerator % denominator).is_zero() {
        quotient + U256::from(1u64)
    } else {
        quotient
    }
}

/// Quote-token amount for `option_amount` option tokens at `price`.
///
/// `amount * fixed(price, quote_decimals) / 10^option_decimals`, with both
/// the fixed-point price and the division rounded in `rounding` direction.
pub fn quote_amount_for(
    option_amount: U256,
    price: f64,
    quote_decimals: u8,
    option_decimals: u8,
    rounding: Rounding,
) -> Option<U256> {
    let price_fixed = scale_price(price, quote_decimals, rounding)?;
    let gross = option_amount.checked_mul(price_fixed)?;
    Some(div_rounded(gross, pow10(option_decimals), rounding))
}

/// Option-token amount purchasable with `quote_amount` quote tokens at `price`.
///
/// Inverse of [`quote_amount_for`]. The price is the divisor, so it is
/// rounded against `rounding`.
pub fn option_amount_for_quote(
    quote_amount: U256,
    price: f64,
    quote_decimals: u8,
    option_decimals: u8,
    rounding: Rounding,
) -> Option<U256> {
    let price_fixed = scale_price(price, quote_decimals, rounding.reverse())?;
    if price_fixed.is_zero() {
        return None;
    }
    let gross = quote_amount.checked_mul(pow10(option_decimals))?;
    Some(div_rounded(gross, price_fixed, rounding))
}
