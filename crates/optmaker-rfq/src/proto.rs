//! Price broadcast schema.
//!
//! Field numbers are fixed by the receiving venue.

/// One quote-book snapshot.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LevelsSchema {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(string, tag = "2")]
    pub msg_topic: String,
    #[prost(string, tag = "3")]
    pub msg_type: String,
    #[prost(message, repeated, tag = "4")]
    pub levels: Vec<LevelInfo>,
    #[prost(string, tag = "5")]
    pub maker_id: String,
}

/// Levels for one option against its quote token. `bids` and `asks` are
/// flat `[price, size, price, size, ...]` arrays.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LevelInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub base_address: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub base_decimals: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub quote_address: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub quote_decimals: u32,
    #[prost(float, repeated, tag = "5")]
    pub bids: Vec<f32>,
    #[prost(float, repeated, tag = "6")]
    pub asks: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_levels_schema_decodes_what_it_encodes() {
        let schema = LevelsSchema {
            chain_id: 42161,
            msg_topic: "pricing".to_string(),
            msg_type: "levels".to_string(),
            levels: vec![LevelInfo {
                base_address: vec![0xa1; 20],
                base_decimals: 18,
                quote_address: vec![0x05; 20],
                quote_decimals: 6,
                bids: vec![150.0, 1.0],
                asks: vec![155.5, 1.0],
            }],
            maker_id: "maker-1".to_string(),
        };
        let bytes = schema.encode_to_vec();
        // chain_id is field 1, varint
        assert_eq!(bytes[0], 0x08);
        let decoded = LevelsSchema::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, schema);
    }
}
