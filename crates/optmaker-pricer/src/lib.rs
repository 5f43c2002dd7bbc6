//! Option registry and pricers.
//!
//! Two interchangeable `Pricer` implementations selected at startup:
//! - `ModelPricer`: Black-Scholes at the cached spot price with a
//!   configurable volatility and symmetric spread
//! - `ExchangePricer`: options exchange top-of-book mapped onto each
//!   registered option through an instrument name
//!
//! Both share the RFQ decision logic in `Pricer::handle_rfq`, which always
//! yields a quote or a decline.

pub mod error;
pub mod exchange;
pub mod model;
pub mod pricer;
pub mod registry;
pub mod rfq;

pub use error::{PricerError, PricerResult};
pub use exchange::{ExchangePricer, ExchangePricerConfig};
pub use model::{ModelPricer, ModelPricerConfig};
pub use pricer::Pricer;
pub use registry::OptionRegistry;
pub use rfq::{DeclineReason, QuoteFill, QuoteSide, RfqDecision, RfqLeg, RfqRequest};
