//! Error types for optmaker-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid strike: {0}")]
    InvalidStrike(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Decimal conversion error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
