//! Pricer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PricerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] optmaker_core::CoreError),
}

pub type PricerResult<T> = Result<T, PricerError>;
