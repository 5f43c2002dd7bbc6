//! Prometheus metrics for optmaker.
//!
//! Covers:
//! - Connection state and reconnects per named connection
//! - RFQ outcomes and decline reasons
//! - Price broadcast frames
//! - Relay events, dedup suppression and distribution clients
//! - Registry and spot source health
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error caught at first use during startup.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, register_int_gauge,
    Counter, CounterVec, Encoder, Gauge, GaugeVec, IntGauge, TextEncoder,
};

const CONNECTION_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "awaiting_heartbeat"];

/// Connection state per connection (1 = active state).
/// Labels: conn, state
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "optmaker_ws_state",
        "WebSocket state per connection (1=active, 0=inactive)",
        &["conn", "state"]
    )
    .unwrap()
});

/// Consecutive failed reconnect attempts per connection.
pub static WS_RECONNECT_ATTEMPTS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "optmaker_ws_reconnect_attempts",
        "Consecutive failed reconnect attempts",
        &["conn"]
    )
    .unwrap()
});

/// Sessions lost per connection.
pub static WS_DISCONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optmaker_ws_disconnects_total",
        "WebSocket sessions lost",
        &["conn"]
    )
    .unwrap()
});

pub static RFQ_RECEIVED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("optmaker_rfq_received_total", "RFQ requests received").unwrap()
});

pub static RFQ_QUOTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("optmaker_rfq_quoted_total", "RFQ requests answered with a quote").unwrap()
});

/// Labels: reason
pub static RFQ_DECLINED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optmaker_rfq_declined_total",
        "RFQ requests declined",
        &["reason"]
    )
    .unwrap()
});

pub static RFQ_UNSIGNED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "optmaker_rfq_unsigned_total",
        "Quotes sent without a signature (no key configured)"
    )
    .unwrap()
});

pub static BROADCAST_FRAMES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("optmaker_broadcast_frames_total", "Price broadcast frames sent").unwrap()
});

pub static BROADCAST_LEVELS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("optmaker_broadcast_levels", "Options in the last broadcast frame").unwrap()
});

/// Labels: reason (no_price, non_positive, wide_spread)
pub static BROADCAST_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optmaker_broadcast_skipped_total",
        "Options left out of a broadcast frame",
        &["reason"]
    )
    .unwrap()
});

/// Labels: chain
pub static RELAY_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optmaker_relay_events_total",
        "Pair updates decoded by the relay",
        &["chain"]
    )
    .unwrap()
});

/// Labels: chain
pub static RELAY_DECODE_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optmaker_relay_decode_errors_total",
        "Relay frames that failed to decode",
        &["chain"]
    )
    .unwrap()
});

pub static DEDUP_SUPPRESSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "optmaker_dedup_suppressed_total",
        "Price events suppressed as unchanged top-of-book"
    )
    .unwrap()
});

pub static DISTRIBUTION_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "optmaker_distribution_clients",
        "Connected distribution server clients"
    )
    .unwrap()
});

pub static OPTIONS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("optmaker_options_registered", "Registered option tokens").unwrap()
});

pub static OPTIONS_QUOTABLE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "optmaker_options_quotable",
        "Registered options with a price source"
    )
    .unwrap()
});

/// Labels: source
pub static SPOT_SOURCE_FAILURES: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "optmaker_spot_source_failures",
        "Failed spot source requests since startup",
        &["source"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Mark `state` active for `conn`, all other states inactive.
    pub fn ws_state_set(conn: &str, state: &str) {
        for s in CONNECTION_STATES {
            WS_STATE.with_label_values(&[conn, s]).set(0.0);
        }
        WS_STATE.with_label_values(&[conn, state]).set(1.0);
    }

    pub fn ws_reconnect_attempts(conn: &str, attempts: u32) {
        WS_RECONNECT_ATTEMPTS
            .with_label_values(&[conn])
            .set(f64::from(attempts));
    }

    pub fn ws_disconnected(conn: &str) {
        WS_DISCONNECTS_TOTAL.with_label_values(&[conn]).inc();
    }

    pub fn rfq_received() {
        RFQ_RECEIVED_TOTAL.inc();
    }

    pub fn rfq_quoted() {
        RFQ_QUOTED_TOTAL.inc();
    }

    pub fn rfq_declined(reason: &str) {
        RFQ_DECLINED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn rfq_unsigned() {
        RFQ_UNSIGNED_TOTAL.inc();
    }

    pub fn broadcast_sent(levels: usize) {
        BROADCAST_FRAMES_TOTAL.inc();
        BROADCAST_LEVELS.set(levels as f64);
    }

    pub fn broadcast_skipped(reason: &str) {
        BROADCAST_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn relay_event(chain_id: u32) {
        RELAY_EVENTS_TOTAL
            .with_label_values(&[chain_id.to_string().as_str()])
            .inc();
    }

    pub fn relay_decode_error(chain_id: u32) {
        RELAY_DECODE_ERRORS_TOTAL
            .with_label_values(&[chain_id.to_string().as_str()])
            .inc();
    }

    pub fn dedup_suppressed() {
        DEDUP_SUPPRESSED_TOTAL.inc();
    }

    pub fn distribution_clients(count: usize) {
        DISTRIBUTION_CLIENTS.set(count as i64);
    }

    pub fn options(registered: usize, quotable: usize) {
        OPTIONS_REGISTERED.set(registered as i64);
        OPTIONS_QUOTABLE.set(quotable as i64);
    }

    pub fn spot_source_failures(source: &str, failures: u64) {
        SPOT_SOURCE_FAILURES
            .with_label_values(&[source])
            .set(failures as f64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_state_single_active() {
        Metrics::ws_state_set("test-conn", "connected");
        Metrics::ws_state_set("test-conn", "awaiting_heartbeat");
        assert_eq!(
            WS_STATE.with_label_values(&["test-conn", "connected"]).get(),
            0.0
        );
        assert_eq!(
            WS_STATE
                .with_label_values(&["test-conn", "awaiting_heartbeat"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_encode_contains_counters() {
        Metrics::rfq_declined("no_price");
        let text = Metrics::encode().unwrap();
        assert!(text.contains("optmaker_rfq_declined_total"));
    }
}
