//! RFQ protocol layer for optmaker.
//!
//! This crate provides:
//! - `RfqClient`: connection to the RFQ network, request dispatch to a `Pricer`
//! - `QuoteSigner`: EIP-712 signatures over accepted quotes
//! - `PriceBroadcaster`: periodic binary snapshot of the quote book
//! - Wire messages (JSON envelopes) and the protobuf broadcast schema

pub mod broadcast;
pub mod client;
pub mod error;
pub mod messages;
pub mod proto;
pub mod signer;

pub use broadcast::{build_levels, BroadcastConfig, PriceBroadcaster};
pub use client::{RfqClient, RfqClientConfig, MAKER_ID_HEADER};
pub use error::{RfqError, RfqResult};
pub use messages::{encode_decline, encode_quote, parse_inbound, Inbound, InboundRfq, QuotedLeg};
pub use proto::{LevelInfo, LevelsSchema};
pub use signer::{KeyError, KeyManager, KeySource, QuoteSigner, QuoteTerms, SignerError};
