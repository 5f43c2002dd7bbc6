//! Relay error types.

use optmaker_ws::WsError;
use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid pair record: {0}")]
    InvalidRecord(String),

    #[error("Relay already running")]
    AlreadyRunning,

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
