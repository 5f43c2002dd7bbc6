//! RFQ wire messages.
//!
//! Every frame is a JSON envelope `{"type": .., "msg": {..}}`. The inbound
//! `msg` object is kept verbatim and echoed in the quote with only the maker
//! fields overwritten, so partner-specific fields (event id, nonce, command
//! payload, fees) round-trip untouched and in their original key order.

use crate::error::{RfqError, RfqResult};
use optmaker_core::{Address, U256};
use optmaker_pricer::{RfqLeg, RfqRequest};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const MSG_RFQ: &str = "rfq";
pub const MSG_QUOTE: &str = "quote";
pub const MSG_DECLINE: &str = "decline";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    msg: Value,
}

#[derive(Debug, Deserialize)]
struct InboundLeg {
    address: String,
    #[serde(default)]
    amount: Value,
    decimals: u8,
}

#[derive(Debug, Deserialize)]
struct RfqFields {
    quote_id: String,
    #[serde(default)]
    partner_id: u64,
    #[serde(default)]
    nonce: Value,
    taker: String,
    #[serde(default)]
    receiver: Option<String>,
    #[serde(default)]
    expiry: u64,
    #[serde(default)]
    commands: Option<String>,
    sell_tokens: Vec<InboundLeg>,
    buy_tokens: Vec<InboundLeg>,
}

/// Normalized inbound RFQ plus what is needed to answer it.
#[derive(Debug, Clone)]
pub struct InboundRfq {
    pub request: RfqRequest,
    pub partner_id: u64,
    pub nonce: U256,
    pub taker: Address,
    /// Defaults to the taker when absent.
    pub receiver: Address,
    /// Expiry the taker asked for (unix seconds, 0 if absent).
    pub requested_expiry: u64,
    pub commands: Vec<u8>,
    /// Inbound `msg` object.
    pub echo: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub enum Inbound {
    Rfq(Box<InboundRfq>),
    /// Any other message type; logged and ignored.
    Other(String),
}

/// Filled leg of an outbound quote.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotedLeg {
    pub amount: U256,
    /// Reference price of this leg in units of the other leg.
    pub price: f64,
}

fn parse_address(value: &str, field: &str, quote_id: &str) -> RfqResult<Address> {
    value
        .parse()
        .map_err(|_| RfqError::invalid(Some(quote_id), format!("bad {field} address: {value}")))
}

/// Integer from a decimal or `0x` string, or a JSON number.
fn parse_u256(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

fn parse_leg(leg: &InboundLeg, quote_id: &str) -> RfqResult<RfqLeg> {
    let amount = match &leg.amount {
        Value::Null => None,
        other => Some(parse_u256(other).ok_or_else(|| {
            RfqError::invalid(Some(quote_id), format!("bad amount: {other}"))
        })?),
    };
    Ok(RfqLeg {
        token: parse_address(&leg.address, "token", quote_id)?,
        amount,
        decimals: leg.decimals,
    })
}

fn parse_rfq(msg: Value) -> RfqResult<InboundRfq> {
    let Value::Object(echo) = msg else {
        return Err(RfqError::invalid(None, "rfq msg is not an object"));
    };
    let quote_id = echo.get("quote_id").and_then(Value::as_str).map(str::to_string);
    let fields: RfqFields = serde_json::from_value(Value::Object(echo.clone()))
        .map_err(|e| RfqError::invalid(quote_id.as_deref(), e.to_string()))?;
    let id = fields.quote_id.as_str();

    let (sell, buy) = match (fields.sell_tokens.as_slice(), fields.buy_tokens.as_slice()) {
        ([sell], [buy]) => (parse_leg(sell, id)?, parse_leg(buy, id)?),
        (sells, buys) => {
            return Err(RfqError::invalid(
                Some(id),
                format!("unsupported leg count {}x{}", sells.len(), buys.len()),
            ))
        }
    };

    let taker = parse_address(&fields.taker, "taker", id)?;
    let receiver = match fields.receiver.as_deref() {
        Some(r) if !r.is_empty() => parse_address(r, "receiver", id)?,
        _ => taker,
    };
    let nonce = match &fields.nonce {
        Value::Null => U256::ZERO,
        other => parse_u256(other)
            .ok_or_else(|| RfqError::invalid(Some(id), format!("bad nonce: {other}")))?,
    };
    let commands = match fields.commands.as_deref() {
        Some(hex_str) => hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| RfqError::invalid(Some(id), format!("bad commands: {e}")))?,
        None => Vec::new(),
    };

    Ok(InboundRfq {
        request: RfqRequest {
            quote_id: fields.quote_id.clone(),
            sell,
            buy,
        },
        partner_id: fields.partner_id,
        nonce,
        taker,
        receiver,
        requested_expiry: fields.expiry,
        commands,
        echo,
    })
}

/// Parse one inbound text frame.
///
/// # Errors
/// `RfqError::InvalidMessage` for malformed frames; its `quote_id` is set
/// when the request can still be declined.
pub fn parse_inbound(text: &str) -> RfqResult<Inbound> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| RfqError::invalid(None, e.to_string()))?;
    if envelope.kind != MSG_RFQ {
        return Ok(Inbound::Other(envelope.kind));
    }
    parse_rfq(envelope.msg).map(|rfq| Inbound::Rfq(Box::new(rfq)))
}

fn fill_leg(echo: &mut Map<String, Value>, key: &str, leg: &QuotedLeg) {
    let Some(Value::Object(obj)) = echo
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .and_then(|legs| legs.first_mut())
    else {
        return;
    };
    obj.insert("amount".to_string(), Value::String(leg.amount.to_string()));
    obj.insert("price".to_string(), json!(leg.price));
}

/// Quote frame: the inbound `msg` with maker, expiry, leg amounts, leg prices
/// and signature filled in.
pub fn encode_quote(
    mut echo: Map<String, Value>,
    maker: Address,
    expiry: u64,
    sell: &QuotedLeg,
    buy: &QuotedLeg,
    signature: Option<String>,
) -> String {
    echo.insert("maker".to_string(), Value::String(maker.to_string()));
    echo.insert("expiry".to_string(), json!(expiry));
    fill_leg(&mut echo, "sell_tokens", sell);
    fill_leg(&mut echo, "buy_tokens", buy);
    echo.insert(
        "signature".to_string(),
        signature.map(Value::String).unwrap_or(Value::Null),
    );
    json!({ "type": MSG_QUOTE, "msg": echo }).to_string()
}

pub fn encode_decline(quote_id: &str, reason: &str) -> String {
    json!({
        "type": MSG_DECLINE,
        "msg": { "quote_id": quote_id, "reason": reason },
    })
    .to_string()
}
