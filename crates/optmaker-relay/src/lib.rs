//! Market-data relay and internal distribution for optmaker.
//!
//! - `MarketDataRelay`: one connection per venue, protobuf frames decoded
//!   into `PriceEvent`s and cached per (chain id, pair)
//! - `Distributor`: tracked-token filter and top-of-book dedup
//! - `DistributionServer`: WebSocket fan-out with per-client subscriptions

pub mod cache;
pub mod dedup;
pub mod distributor;
pub mod error;
pub mod event;
pub mod proto;
pub mod relay;
pub mod server;
pub mod subscription;

pub use cache::{RelayCache, DEFAULT_RELAY_STALENESS_MS};
pub use dedup::Deduplicator;
pub use distributor::{Distributor, TokenFilter};
pub use error::{RelayError, RelayResult};
pub use event::{pair_key, Level, PriceEvent};
pub use proto::{PairUpdate, PricingUpdate};
pub use relay::{decode_frame, MarketDataRelay, RelayConfig, RelayVenue};
pub use server::{ClientMessage, ConnectionLimiter, DistributionConfig, DistributionServer, ServerMessage};
pub use subscription::Subscription;
