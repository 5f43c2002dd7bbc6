//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No instruments returned for {0}")]
    NoInstruments(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Feed already running")]
    AlreadyRunning,

    #[error("WebSocket error: {0}")]
    Ws(#[from] optmaker_ws::WsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
