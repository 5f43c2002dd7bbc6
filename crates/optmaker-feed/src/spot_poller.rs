//! Spot price poller.
//!
//! Queries every configured REST source concurrently for each symbol,
//! discards failures and writes the median of the successful observations.

use crate::error::{FeedError, FeedResult};
use crate::spot::SpotCache;
use dashmap::DashMap;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Public REST ticker source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotSource {
    Binance,
    Coinbase,
    Kraken,
}

impl SpotSource {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Binance => "https://api.binance.com",
            Self::Coinbase => "https://api.coinbase.com",
            Self::Kraken => "https://api.kraken.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
        }
    }

    /// Ticker URL for `symbol` against USD (USDT on Binance).
    pub fn ticker_url(&self, base_url: &str, symbol: &str) -> String {
        let base = base_url.trim_end_matches('/');
        let symbol = symbol.to_uppercase();
        match self {
            Self::Binance => format!("{base}/api/v3/ticker/price?symbol={symbol}USDT"),
            Self::Coinbase => format!("{base}/v2/prices/{symbol}-USD/spot"),
            Self::Kraken => format!("{base}/0/public/Ticker?pair={symbol}USD"),
        }
    }

    /// Extract the last price from the source's response body.
    pub fn parse_price(&self, body: &Value) -> FeedResult<f64> {
        let raw = match self {
            Self::Binance => body.get("price"),
            Self::Coinbase => body.get("data").and_then(|d| d.get("amount")),
            Self::Kraken => {
                if let Some(err) = body
                    .get("error")
                    .and_then(Value::as_array)
                    .filter(|errs| !errs.is_empty())
                {
                    return Err(FeedError::ParseError(format!("kraken error: {err:?}")));
                }
                body.get("result")
                    .and_then(Value::as_object)
                    .and_then(|pairs| pairs.values().next())
                    .and_then(|ticker| ticker.get("c"))
                    .and_then(|last| last.get(0))
            }
        };
        let price = match raw {
            Some(Value::String(s)) => s.parse::<f64>().ok(),
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        };
        price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| FeedError::ParseError(format!("{}: no price in response", self.as_str())))
    }
}

/// One configured source.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotSourceConfig {
    pub kind: SpotSource,
    /// Overrides the public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SpotSourceConfig {
    fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct SpotPollerConfig {
    pub sources: Vec<SpotSourceConfig>,
    /// Uppercase underlying symbols.
    pub symbols: Vec<String>,
    pub interval: Duration,
}

/// Median of a non-empty slice. `None` when empty.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Polls spot sources and writes the aggregated price into a `SpotCache`.
pub struct SpotPoller {
    client: Client,
    config: SpotPollerConfig,
    cache: Arc<SpotCache>,
    failures: DashMap<SpotSource, u64>,
}

impl SpotPoller {
    pub fn new(config: SpotPollerConfig, cache: Arc<SpotCache>) -> FeedResult<Self> {
        if config.interval.is_zero() {
            return Err(FeedError::InvalidConfig("spot poll interval must be positive".to_string()));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            cache,
            failures: DashMap::new(),
        })
    }

    /// Failure count per source since startup.
    pub fn failure_count(&self, source: SpotSource) -> u64 {
        self.failures.get(&source).map(|v| *v).unwrap_or(0)
    }

    async fn fetch(&self, source: &SpotSourceConfig, symbol: &str) -> FeedResult<f64> {
        let url = source.kind.ticker_url(source.base_url(), symbol);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Http(format!("HTTP {status} from {url}")));
        }
        let body: Value = response.json().await?;
        source.kind.parse_price(&body)
    }

    /// Poll every source for `symbol` and cache the median.
    ///
    /// Returns the stored price, or `None` when every source failed.
    pub async fn poll_symbol(&self, symbol: &str) -> Option<f64> {
        let fetches = self
            .config
            .sources
            .iter()
            .map(|source| async move { (source.kind, self.fetch(source, symbol).await) });

        let mut prices = Vec::with_capacity(self.config.sources.len());
        for (kind, result) in join_all(fetches).await {
            match result {
                Ok(price) => prices.push(price),
                Err(e) => {
                    *self.failures.entry(kind).or_insert(0) += 1;
                    debug!(source = kind.as_str(), symbol, error = %e, "Spot source failed");
                }
            }
        }

        let count = prices.len();
        let Some(price) = median(&mut prices) else {
            warn!(symbol, "No spot source returned a price");
            return None;
        };
        self.cache.update(symbol, price, count);
        debug!(symbol, price, sources = count, "Spot price updated");
        Some(price)
    }

    /// Poll every configured symbol once.
    pub async fn poll_once(&self) -> usize {
        let polls = self.config.symbols.iter().map(|s| self.poll_symbol(s));
        join_all(polls).await.into_iter().flatten().count()
    }

    /// Poll on the configured interval until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            symbols = ?self.config.symbols,
            sources = self.config.sources.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Spot poller started"
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                () = shutdown.cancelled() => {
                    info!("Spot poller stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0]), Some(3.0));
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_parse_binance() {
        let body = json!({"symbol": "ETHUSDT", "price": "3100.50000000"});
        assert_eq!(SpotSource::Binance.parse_price(&body).unwrap(), 3100.5);
    }

    #[test]
    fn test_parse_coinbase() {
        let body = json!({"data": {"amount": "3099.12", "base": "ETH", "currency": "USD"}});
        assert_eq!(SpotSource::Coinbase.parse_price(&body).unwrap(), 3099.12);
    }

    #[test]
    fn test_parse_kraken() {
        let body = json!({
            "error": [],
            "result": {"XETHZUSD": {"a": ["3101.0", "1", "1.0"], "c": ["3100.75", "0.01"]}}
        });
        assert_eq!(SpotSource::Kraken.parse_price(&body).unwrap(), 3100.75);

        let err = json!({"error": ["EQuery:Unknown asset pair"]});
        assert!(SpotSource::Kraken.parse_price(&err).is_err());
    }

    #[test]
    fn test_parse_rejects_non_positive() {
        let body = json!({"price": "0"});
        assert!(SpotSource::Binance.parse_price(&body).is_err());
    }

    #[test]
    fn test_ticker_urls() {
        assert_eq!(
            SpotSource::Binance.ticker_url("https://api.binance.com/", "eth"),
            "https://api.binance.com/api/v3/ticker/price?symbol=ETHUSDT"
        );
        assert_eq!(
            SpotSource::Coinbase.ticker_url("http://x", "BTC"),
            "http://x/v2/prices/BTC-USD/spot"
        );
        assert_eq!(
            SpotSource::Kraken.ticker_url("http://x", "ETH"),
            "http://x/0/public/Ticker?pair=ETHUSD"
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let cache = Arc::new(SpotCache::new(5_000, Arc::new(optmaker_core::ManualClock::new(0))));
        let config = SpotPollerConfig {
            sources: vec![],
            symbols: vec!["ETH".to_string()],
            interval: Duration::ZERO,
        };
        assert!(matches!(SpotPoller::new(config, cache), Err(FeedError::InvalidConfig(_))));
    }
}
