//! Implied volatility solver.

use optmaker_core::OptionKind;

use crate::black_scholes::{price, raw_vega, BsInputs};

/// Lower clamp for solved volatility.
pub const IV_MIN: f64 = 0.01;
/// Upper clamp for solved volatility.
pub const IV_MAX: f64 = 5.0;

const MAX_ITERATIONS: usize = 100;
const PRICE_TOLERANCE: f64 = 1e-6;
const MIN_VEGA: f64 = 1e-10;

/// Volatility that reproduces `market_price` under Black-Scholes.
///
/// Newton-Raphson from a Brenner-Subrahmanyam seed, kept inside a bracket
/// on `[IV_MIN, IV_MAX]`. Price is increasing in volatility, so every
/// evaluation shrinks the bracket; a Newton step that leaves it, or a
/// vanishing vega, falls back to bisection. The result is always in
/// `[IV_MIN, IV_MAX]`. Prices outside what the clamp range can produce
/// return the nearer bound.
pub fn implied_volatility(
    kind: OptionKind,
    market_price: f64,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
) -> f64 {
    if time <= 0.0 || spot <= 0.0 || !market_price.is_finite() || market_price <= 0.0 {
        return IV_MIN;
    }

    let base = BsInputs::new(spot, strike, time, rate, IV_MIN);
    if price(kind, &base) >= market_price {
        return IV_MIN;
    }
    if price(kind, &base.with_vol(IV_MAX)) <= market_price {
        return IV_MAX;
    }

    let mut lo = IV_MIN;
    let mut hi = IV_MAX;
    let seed = (2.0 * std::f64::consts::PI / time).sqrt() * market_price / spot;
    let mut vol = seed.clamp(IV_MIN, IV_MAX);

    for _ in 0..MAX_ITERATIONS {
        let inputs = base.with_vol(vol);
        let diff = price(kind, &inputs) - market_price;
        if diff.abs() < PRICE_TOLERANCE {
            break;
        }
        if diff > 0.0 {
            hi = vol;
        } else {
            lo = vol;
        }
        if hi - lo <= f64::EPSILON * hi {
            break;
        }

        let vega = raw_vega(&inputs);
        let newton = vol - diff / vega;
        vol = if vega.abs() >= MIN_VEGA && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }

    vol
}
