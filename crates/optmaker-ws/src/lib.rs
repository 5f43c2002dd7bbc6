//! Reconnecting WebSocket client.
//!
//! One `ConnectionManager` per long-lived connection:
//! - Custom handshake headers (maker identity, API keys)
//! - Automatic reconnection with capped exponential backoff
//! - Transport-level ping heartbeat with pong timeout
//! - Channel-based outbound writes (`WsWriteHandle`) and inbound events (`WsEvent`)

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod write_handle;

pub use connection::{backoff_delay, ConnectionConfig, ConnectionManager, ConnectionState, WsEvent};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatManager;
pub use write_handle::{WsOutbound, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any TLS connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
