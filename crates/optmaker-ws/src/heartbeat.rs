//! Heartbeat management for WebSocket connections.
//!
//! Tracks transport ping/pong timing. A ping is due once per interval; a
//! connection whose pong does not arrive within the timeout is considered
//! dead and torn down by the connection manager.

use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct HeartbeatState {
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    last_message: Instant,
    session_start: Instant,
    waiting_for_pong: bool,
}

impl HeartbeatState {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            last_ping: None,
            last_pong: None,
            last_message: now,
            session_start: now,
            waiting_for_pong: false,
        }
    }
}

/// Heartbeat manager for one connection.
pub struct HeartbeatManager {
    interval: Duration,
    timeout: Duration,
    state: RwLock<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: RwLock::new(HeartbeatState::fresh()),
        }
    }

    /// Reset heartbeat state (called on every successful open).
    pub fn reset(&self) {
        *self.state.write() = HeartbeatState::fresh();
    }

    pub fn record_ping(&self) {
        let mut state = self.state.write();
        state.last_ping = Some(Instant::now());
        state.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Instant::now();
        let mut state = self.state.write();
        state.last_pong = Some(now);
        state.waiting_for_pong = false;
        if let Some(ping) = state.last_ping {
            debug!(rtt_ms = now.duration_since(ping).as_millis() as u64, "Received pong");
        }
    }

    /// Record that any frame was received.
    pub fn record_message(&self) {
        self.state.write().last_message = Instant::now();
    }

    pub fn is_waiting_for_pong(&self) -> bool {
        self.state.read().waiting_for_pong
    }

    /// True if a ping is outstanding for longer than the timeout.
    pub fn is_timed_out(&self) -> bool {
        let state = self.state.read();
        match (state.waiting_for_pong, state.last_ping) {
            (true, Some(ping)) => ping.elapsed() > self.timeout,
            _ => false,
        }
    }

    /// True if no ping is outstanding and a full interval has passed since
    /// the last ping (or since the session opened).
    pub fn should_send_ping(&self) -> bool {
        let state = self.state.read();
        if state.waiting_for_pong {
            return false;
        }
        let since = state.last_ping.unwrap_or(state.session_start);
        since.elapsed() >= self.interval
    }

    pub fn time_since_last_message(&self) -> Duration {
        self.state.read().last_message.elapsed()
    }

    /// Sleep until the next heartbeat check.
    pub async fn wait_for_check(&self) {
        let step = (self.interval / 2).min(self.timeout / 2);
        tokio::time::sleep(step.max(Duration::from_millis(10))).await;
    }
}
