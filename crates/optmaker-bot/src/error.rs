//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conditions under which the process could never quote.
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Core error: {0}")]
    Core(#[from] optmaker_core::CoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] optmaker_feed::FeedError),

    #[error("Pricer error: {0}")]
    Pricer(#[from] optmaker_pricer::PricerError),

    #[error("RFQ error: {0}")]
    Rfq(#[from] optmaker_rfq::RfqError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] optmaker_ws::WsError),

    #[error("Signing key error: {0}")]
    Key(#[from] optmaker_rfq::KeyError),

    #[error("Relay error: {0}")]
    Relay(#[from] optmaker_relay::RelayError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] optmaker_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
