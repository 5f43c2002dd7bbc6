//! Options exchange instrument discovery.
//!
//! Instrument names follow the `UNDERLYING-DMMMYY-STRIKE-C|P` convention,
//! e.g. `ETH-28MAR25-3000-C`.

use crate::error::{FeedError, FeedResult};
use chrono::DateTime;
use optmaker_core::OptionKind;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Exchange instrument metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentInfo {
    pub name: String,
    pub underlying: String,
    pub strike: f64,
    /// Expiration, unix milliseconds.
    pub expiry_ms: i64,
    pub kind: OptionKind,
}

/// Exchange instrument name for an option.
///
/// The expiry date is rendered as day without padding, uppercase month
/// abbreviation and two-digit year; the strike is rounded to an integer.
pub fn instrument_name(underlying: &str, expiry_secs: i64, strike: f64, kind: OptionKind) -> Option<String> {
    let expiry = DateTime::from_timestamp(expiry_secs, 0)?;
    let date = expiry.format("%-d%b%y").to_string().to_uppercase();
    Some(format!(
        "{}-{}-{}-{}",
        underlying.to_uppercase(),
        date,
        strike.round() as i64,
        kind.letter()
    ))
}

/// Instruments known to the exchange, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct InstrumentIndex {
    by_name: HashMap<String, InstrumentInfo>,
}

impl InstrumentIndex {
    pub fn new(instruments: impl IntoIterator<Item = InstrumentInfo>) -> Self {
        Self {
            by_name: instruments
                .into_iter()
                .map(|i| (i.name.clone(), i))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&InstrumentInfo> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Merge instruments from another discovery pass.
    pub fn extend(&mut self, other: InstrumentIndex) {
        self.by_name.extend(other.by_name);
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    result: Vec<RawInstrument>,
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    instrument_name: String,
    #[serde(default)]
    base_currency: Option<String>,
    strike: Option<f64>,
    expiration_timestamp: i64,
    option_type: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

impl RawInstrument {
    fn into_info(self, currency: &str) -> Option<InstrumentInfo> {
        if !self.is_active {
            return None;
        }
        let kind = match self.option_type.as_deref()? {
            "call" => OptionKind::Call,
            "put" => OptionKind::Put,
            _ => return None,
        };
        Some(InstrumentInfo {
            underlying: self
                .base_currency
                .unwrap_or_else(|| currency.to_string())
                .to_uppercase(),
            name: self.instrument_name,
            strike: self.strike?,
            expiry_ms: self.expiration_timestamp,
            kind,
        })
    }
}

/// Parse a `get_instruments` response body.
pub fn parse_instruments(body: &str, currency: &str) -> FeedResult<Vec<InstrumentInfo>> {
    let response: InstrumentsResponse = serde_json::from_str(body)?;
    Ok(response
        .result
        .into_iter()
        .filter_map(|raw| raw.into_info(currency))
        .collect())
}

/// REST client for instrument discovery.
pub struct InstrumentClient {
    client: Client,
    rest_url: String,
}

impl InstrumentClient {
    pub fn new(rest_url: impl Into<String>) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            rest_url: rest_url.into(),
        })
    }

    /// Fetch active options for one currency.
    ///
    /// # Errors
    /// `FeedError::NoInstruments` if the exchange lists none.
    pub async fn fetch_index(&self, currency: &str) -> FeedResult<InstrumentIndex> {
        let url = format!(
            "{}/public/get_instruments?currency={}&kind=option&expired=false",
            self.rest_url.trim_end_matches('/'),
            currency.to_uppercase()
        );
        info!(%url, "Fetching exchange instruments");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Http(format!("HTTP {status}: {body}")));
        }
        let body = response.text().await?;
        let instruments = parse_instruments(&body, currency)?;
        if instruments.is_empty() {
            return Err(FeedError::NoInstruments(currency.to_string()));
        }
        debug!(count = instruments.len(), currency, "Instruments discovered");
        Ok(InstrumentIndex::new(instruments))
    }

    /// Fetch and merge several currencies. Fails only if all are empty.
    pub async fn fetch_all(&self, currencies: &[String]) -> FeedResult<InstrumentIndex> {
        let mut index = InstrumentIndex::default();
        let mut last_err = None;
        for currency in currencies {
            match self.fetch_index(currency).await {
                Ok(found) => index.extend(found),
                Err(e) => last_err = Some(e),
            }
        }
        match (index.is_empty(), last_err) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(FeedError::NoInstruments(currencies.join(","))),
            (false, _) => Ok(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_name_format() {
        // 2025-03-28 08:00:00 UTC
        let expiry = 1_743_148_800;
        assert_eq!(
            instrument_name("eth", expiry, 3000.0, OptionKind::Call).unwrap(),
            "ETH-28MAR25-3000-C"
        );
        assert_eq!(
            instrument_name("BTC", expiry, 84_999.6, OptionKind::Put).unwrap(),
            "BTC-28MAR25-85000-P"
        );
    }

    #[test]
    fn test_single_digit_day_unpadded() {
        // 2025-04-04 08:00:00 UTC
        assert_eq!(
            instrument_name("ETH", 1_743_753_600, 2500.0, OptionKind::Put).unwrap(),
            "ETH-4APR25-2500-P"
        );
    }

    #[test]
    fn test_parse_instruments_skips_inactive_and_non_options() {
        let body = r#"{"jsonrpc":"2.0","result":[
            {"instrument_name":"ETH-28MAR25-3000-C","base_currency":"ETH","strike":3000.0,
             "expiration_timestamp":1743148800000,"option_type":"call","is_active":true},
            {"instrument_name":"ETH-28MAR25-2500-P","base_currency":"ETH","strike":2500.0,
             "expiration_timestamp":1743148800000,"option_type":"put","is_active":false},
            {"instrument_name":"ETH-PERPETUAL","base_currency":"ETH",
             "expiration_timestamp":32503708800000}
        ]}"#;
        let parsed = parse_instruments(body, "ETH").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, OptionKind::Call);
        assert_eq!(parsed[0].strike, 3000.0);

        let index = InstrumentIndex::new(parsed);
        assert!(index.contains("ETH-28MAR25-3000-C"));
        assert!(!index.contains("ETH-28MAR25-2500-P"));
    }
}
