//! optmaker application.
//!
//! Wires the pricer, feeds, RFQ client, price broadcaster and market-data
//! relay together:
//! - `AppConfig`: TOML configuration with defaults for every field
//! - `OptionDiscovery`: source of tradable options (static list built in)
//! - `Application`: startup checks, task orchestration, stats, shutdown

pub mod app;
pub mod config;
pub mod discovery;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, PricerBackend};
pub use discovery::{register_options, OptionDiscovery, RegistrationSummary, StaticDiscovery};
pub use error::{AppError, AppResult};
