//! WebSocket write handle for sending messages.
//!
//! Fire-and-forget: a successful send only means the frame was queued for
//! the current session.

use crate::connection::ConnectionState;
use crate::error::{WsError, WsResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound frame to be sent via WebSocket.
#[derive(Debug)]
pub enum WsOutbound {
    Text(String),
    Binary(Vec<u8>),
}

/// Cloneable, reconnect-safe sender for one connection.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsOutbound>,
    state: Arc<RwLock<ConnectionState>>,
}

impl WsWriteHandle {
    pub fn new(tx: mpsc::Sender<WsOutbound>, state: Arc<RwLock<ConnectionState>>) -> Self {
        Self { tx, state }
    }

    /// Queue a text frame.
    ///
    /// # Errors
    /// - `WsError::NotConnected`: no open session
    /// - `WsError::SendFailed`: the connection manager is gone
    pub async fn send_text(&self, text: String) -> WsResult<()> {
        self.send(WsOutbound::Text(text)).await
    }

    /// Queue a binary frame.
    pub async fn send_binary(&self, data: Vec<u8>) -> WsResult<()> {
        self.send(WsOutbound::Binary(data)).await
    }

    async fn send(&self, frame: WsOutbound) -> WsResult<()> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| WsError::SendFailed("channel closed".to_string()))
    }

    /// True while a session is open (including while a pong is awaited).
    pub fn is_connected(&self) -> bool {
        self.state.read().is_open()
    }
}
