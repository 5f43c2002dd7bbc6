//! Option pricing model.
//!
//! Pure numerical functions with no I/O and no state:
//! - Black-Scholes call/put fair value with degenerate cases
//! - Greeks (theta per day, vega and rho per 1%)
//! - Implied volatility by Newton-Raphson

pub mod black_scholes;
pub mod implied_vol;

pub use black_scholes::{greeks, norm_cdf, norm_pdf, price, BsInputs};
pub use implied_vol::{implied_volatility, IV_MAX, IV_MIN};
