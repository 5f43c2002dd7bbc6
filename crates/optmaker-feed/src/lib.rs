//! Market data feeds for the pricers.
//!
//! - `SpotCache` / `SpotPoller`: spot prices aggregated from several REST sources
//! - `InstrumentIndex`: options exchange instrument discovery
//! - `TickerCache` / `ExchangeFeed`: streaming top-of-book, marks and Greeks
//!
//! Every cache has exactly one writer (its feed) and applies staleness at
//! read time: an observation older than the threshold is never served.

pub mod error;
pub mod exchange;
pub mod instruments;
pub mod spot;
pub mod spot_poller;
pub mod ticker;

pub use error::{FeedError, FeedResult};
pub use exchange::{ExchangeFeed, ExchangeFeedConfig};
pub use instruments::{instrument_name, InstrumentClient, InstrumentIndex, InstrumentInfo};
pub use spot::{SpotCache, SpotObservation};
pub use spot_poller::{median, SpotPoller, SpotPollerConfig, SpotSource, SpotSourceConfig};
pub use ticker::{Ticker, TickerCache, TickerGreeks};
