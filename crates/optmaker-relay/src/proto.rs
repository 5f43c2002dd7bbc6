//! Venue market-data schema.

/// One venue frame: any number of pair updates.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PricingUpdate {
    #[prost(message, repeated, tag = "1")]
    pub pairs: Vec<PairUpdate>,
}

/// Book for one base/quote pair. `bids` and `asks` are flat
/// `[price, size, price, size, ...]` arrays, best level first.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PairUpdate {
    #[prost(bytes = "vec", tag = "1")]
    pub base: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub quote: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub last_update_ts: u64,
    #[prost(float, repeated, tag = "4")]
    pub bids: Vec<f32>,
    #[prost(float, repeated, tag = "5")]
    pub asks: Vec<f32>,
}
