//! RFQ error types.

use optmaker_ws::WsError;
use thiserror::Error;

pub type RfqResult<T> = Result<T, RfqError>;

#[derive(Debug, Error)]
pub enum RfqError {
    /// Frame could not be turned into an RFQ. `quote_id` is set when it was
    /// recoverable, in which case the request is declined.
    #[error("Invalid message: {reason}")]
    InvalidMessage {
        quote_id: Option<String>,
        reason: String,
    },

    #[error("Client already running")]
    AlreadyRunning,

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RfqError {
    pub(crate) fn invalid(quote_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            quote_id: quote_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}
