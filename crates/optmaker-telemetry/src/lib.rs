//! Prometheus metrics and structured logging for optmaker.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters and gauges behind the `Metrics` facade

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
