//! Application configuration.
//!
//! Loaded once from TOML. Every field has a default so a partial file is
//! valid; addresses stay strings here and are parsed when the application
//! is wired.

use crate::error::{AppError, AppResult};
use optmaker_core::{Address, OptionParams, U256};
use optmaker_feed::{ExchangeFeedConfig, SpotSource, SpotSourceConfig};
use optmaker_pricer::{ExchangePricerConfig, ModelPricerConfig};
use optmaker_relay::{DistributionConfig, RelayConfig, RelayVenue};
use optmaker_rfq::{BroadcastConfig, KeySource, RfqClientConfig};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no `--config` is given.
pub const CONFIG_ENV_VAR: &str = "OPTMAKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const DEFAULT_SIGNING_KEY_ENV: &str = "OPTMAKER_SIGNING_KEY";

/// Pricing backend, selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricerBackend {
    #[default]
    Model,
    Exchange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricerConfig {
    #[serde(default)]
    pub backend: PricerBackend,
    #[serde(default = "default_volatility")]
    pub default_volatility: f64,
    /// Per-underlying volatility (model backend).
    #[serde(default)]
    pub volatilities: HashMap<String, f64>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Half-spread as a fraction of mid (model backend).
    #[serde(default = "default_spread_pct")]
    pub spread_pct: f64,
    #[serde(default = "default_min_spread")]
    pub min_spread: f64,
    /// Replaces the exchange spread with a symmetric one around mid.
    #[serde(default)]
    pub spread_override: Option<f64>,
}

fn default_volatility() -> f64 {
    0.8
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_spread_pct() -> f64 {
    0.02
}

fn default_min_spread() -> f64 {
    1.0
}

impl Default for PricerConfig {
    fn default() -> Self {
        Self {
            backend: PricerBackend::default(),
            default_volatility: default_volatility(),
            volatilities: HashMap::new(),
            risk_free_rate: default_risk_free_rate(),
            spread_pct: default_spread_pct(),
            min_spread: default_min_spread(),
            spread_override: None,
        }
    }
}

impl PricerConfig {
    pub fn model(&self) -> ModelPricerConfig {
        ModelPricerConfig {
            default_volatility: self.default_volatility,
            volatilities: self
                .volatilities
                .iter()
                .map(|(symbol, vol)| (symbol.to_uppercase(), *vol))
                .collect(),
            risk_free_rate: self.risk_free_rate,
            spread_pct: self.spread_pct,
            min_spread: self.min_spread,
        }
    }

    pub fn exchange(&self) -> ExchangePricerConfig {
        ExchangePricerConfig {
            spread_override: self.spread_override,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotConfig {
    #[serde(default = "default_spot_sources")]
    pub sources: Vec<SpotSourceConfig>,
    /// Symbols to poll. Empty means the underlyings of the registered options.
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_spot_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_spot_staleness_ms")]
    pub staleness_ms: i64,
}

fn default_spot_sources() -> Vec<SpotSourceConfig> {
    [SpotSource::Binance, SpotSource::Coinbase, SpotSource::Kraken]
        .into_iter()
        .map(|kind| SpotSourceConfig { kind, base_url: None })
        .collect()
}

fn default_spot_poll_interval_ms() -> u64 {
    2_000
}

fn default_spot_staleness_ms() -> i64 {
    5_000
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self {
            sources: default_spot_sources(),
            symbols: Vec::new(),
            poll_interval_ms: default_spot_poll_interval_ms(),
            staleness_ms: default_spot_staleness_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_exchange_rest_url")]
    pub rest_url: String,
    /// Currencies whose option instruments are discovered.
    #[serde(default = "default_exchange_currencies")]
    pub currencies: Vec<String>,
    #[serde(default = "default_exchange_staleness_ms")]
    pub staleness_ms: i64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_exchange_ws_url() -> String {
    "wss://www.deribit.com/ws/api/v2".to_string()
}

fn default_exchange_rest_url() -> String {
    "https://www.deribit.com/api/v2".to_string()
}

fn default_exchange_currencies() -> Vec<String> {
    vec!["ETH".to_string(), "BTC".to_string()]
}

fn default_exchange_staleness_ms() -> i64 {
    60_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            ws_url: default_exchange_ws_url(),
            rest_url: default_exchange_rest_url(),
            currencies: default_exchange_currencies(),
            staleness_ms: default_exchange_staleness_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl ExchangeConfig {
    pub fn feed(&self) -> ExchangeFeedConfig {
        ExchangeFeedConfig {
            ws_url: self.ws_url.clone(),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RfqConfig {
    #[serde(default)]
    pub url: String,
    /// Extra handshake headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Maker address for unsigned quotes.
    #[serde(default)]
    pub maker_address: Option<String>,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_quote_validity_secs")]
    pub quote_validity_secs: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    300_000
}

fn default_quote_validity_secs() -> u64 {
    30
}

impl Default for RfqConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: BTreeMap::new(),
            maker_address: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            quote_validity_secs: default_quote_validity_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Dedicated broadcast endpoint. Unset means the RFQ connection is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_broadcast_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_broadcast_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: f64,
    /// Token the levels are quoted in.
    #[serde(default)]
    pub quote_token: String,
    #[serde(default = "default_quote_decimals")]
    pub quote_decimals: u8,
    #[serde(default = "default_level_size")]
    pub level_size: f64,
}

fn default_true() -> bool {
    true
}

fn default_broadcast_interval_ms() -> u64 {
    10_000
}

fn default_broadcast_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_spread_bps() -> f64 {
    500.0
}

fn default_quote_decimals() -> u8 {
    6
}

fn default_level_size() -> f64 {
    1.0
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            interval_ms: default_broadcast_interval_ms(),
            initial_delay_ms: default_broadcast_initial_delay_ms(),
            max_spread_bps: default_max_spread_bps(),
            quote_token: String::new(),
            quote_decimals: default_quote_decimals(),
            level_size: default_level_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub venues: Vec<RelayVenue>,
    /// Pairs not involving one of these are not distributed. Empty means all.
    #[serde(default)]
    pub tracked_tokens: Vec<String>,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_relay_staleness_ms")]
    pub staleness_ms: i64,
    #[serde(default = "default_dedup_retention_ms")]
    pub dedup_retention_ms: i64,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

fn default_relay_port() -> u16 {
    8090
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_max_connections() -> usize {
    256
}

fn default_relay_staleness_ms() -> i64 {
    optmaker_relay::DEFAULT_RELAY_STALENESS_MS
}

fn default_dedup_retention_ms() -> i64 {
    300_000
}

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            venues: Vec::new(),
            tracked_tokens: Vec::new(),
            port: default_relay_port(),
            ping_interval_ms: default_ping_interval_ms(),
            max_connections: default_max_connections(),
            staleness_ms: default_relay_staleness_ms(),
            dedup_retention_ms: default_dedup_retention_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Environment variable holding the hex key.
    #[serde(default = "default_signing_key_env")]
    pub key_env: String,
    /// Key file. Takes precedence over `key_env`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Startup fails if the key does not derive this address.
    #[serde(default)]
    pub expected_address: Option<String>,
    /// EIP-712 verifying contract. Required once a key is configured.
    #[serde(default)]
    pub settlement_address: String,
}

fn default_signing_key_env() -> String {
    DEFAULT_SIGNING_KEY_ENV.to_string()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key_env: default_signing_key_env(),
            key_file: None,
            expected_address: None,
            settlement_address: String::new(),
        }
    }
}

impl SigningConfig {
    /// Where the key comes from, or `None` when no key is configured.
    pub fn key_source(&self) -> Option<KeySource> {
        if let Some(path) = &self.key_file {
            return Some(KeySource::File { path: path.clone() });
        }
        std::env::var_os(&self.key_env).map(|_| KeySource::EnvVar {
            var_name: self.key_env.clone(),
        })
    }

    /// Verifying contract for signed quotes. The zero address is refused:
    /// a signature over it settles nowhere.
    pub fn settlement(&self) -> AppResult<Address> {
        if self.settlement_address.trim().is_empty() {
            return Err(AppError::Config(
                "signing.settlement_address is required when a signing key is configured".to_string(),
            ));
        }
        let address = parse_address("signing.settlement_address", &self.settlement_address)?;
        if address == Address::ZERO {
            return Err(AppError::Config("signing.settlement_address must not be the zero address".to_string()));
        }
        Ok(address)
    }
}

/// One statically configured option, in upstream discovery form.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionEntry {
    pub address: String,
    #[serde(default)]
    pub redemption: Option<String>,
    pub underlying: String,
    /// 18-decimal fixed point; puts pre-inverted.
    pub strike: String,
    /// Unix seconds.
    pub expiry: i64,
    #[serde(default)]
    pub is_put: bool,
    #[serde(default = "default_option_decimals")]
    pub decimals: u8,
    pub collateral: String,
}

fn default_option_decimals() -> u8 {
    18
}

impl OptionEntry {
    pub fn to_params(&self) -> AppResult<OptionParams> {
        let redemption = match &self.redemption {
            Some(value) => parse_address("redemption", value)?,
            None => Address::ZERO,
        };
        let strike: U256 = self
            .strike
            .parse()
            .map_err(|e| AppError::Config(format!("option {} strike: {e}", self.address)))?;
        Ok(OptionParams {
            address: parse_address("address", &self.address)?,
            redemption,
            underlying: self.underlying.clone(),
            strike,
            expiry: self.expiry,
            is_put: self.is_put,
            decimals: self.decimals,
            collateral: parse_address("collateral", &self.collateral)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u32,
    #[serde(default)]
    pub maker_id: String,
    #[serde(default)]
    pub pricer: PricerConfig,
    #[serde(default)]
    pub spot: SpotConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub rfq: RfqConfig,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub options: Vec<OptionEntry>,
    /// Re-run option discovery this often. 0 disables refresh.
    #[serde(default)]
    pub discovery_refresh_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_chain_id() -> u32 {
    1
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            maker_id: String::new(),
            pricer: PricerConfig::default(),
            spot: SpotConfig::default(),
            exchange: ExchangeConfig::default(),
            rfq: RfqConfig::default(),
            broadcast: BroadcastSettings::default(),
            relay: RelaySettings::default(),
            signing: SigningConfig::default(),
            options: Vec::new(),
            discovery_refresh_secs: 0,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

pub fn parse_address(field: &str, value: &str) -> AppResult<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{field} '{value}': {e}")))
}

fn parse_optional_address(field: &str, value: Option<&str>) -> AppResult<Option<Address>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_address(field, v))
        .transpose()
}

impl AppConfig {
    /// CLI argument, then `OPTMAKER_CONFIG`, then `config/default.toml`.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, deep inside a task.
    pub fn validate(&self) -> AppResult<()> {
        if self.rfq.url.is_empty() {
            return Err(AppError::Config("rfq.url is required".to_string()));
        }
        if self.maker_id.is_empty() {
            return Err(AppError::Config("maker_id is required".to_string()));
        }
        self.pricer.model().validate()?;
        if self.spot.poll_interval_ms == 0 {
            return Err(AppError::Config("spot.poll_interval_ms must be positive".to_string()));
        }
        if self.broadcast.enabled {
            if self.broadcast.interval_ms == 0 {
                return Err(AppError::Config("broadcast.interval_ms must be positive".to_string()));
            }
            parse_address("broadcast.quote_token", &self.broadcast.quote_token)?;
        }
        if self.relay.enabled && self.relay.ping_interval_ms == 0 {
            return Err(AppError::Config("relay.ping_interval_ms must be positive".to_string()));
        }
        if self.signing.key_source().is_some() {
            self.signing.settlement()?;
            parse_optional_address("signing.expected_address", self.signing.expected_address.as_deref())?;
        }
        for token in &self.relay.tracked_tokens {
            parse_address("relay.tracked_tokens", token)?;
        }
        parse_optional_address("rfq.maker_address", self.rfq.maker_address.as_deref())?;
        Ok(())
    }

    pub fn rfq_client(&self) -> AppResult<RfqClientConfig> {
        Ok(RfqClientConfig {
            url: self.rfq.url.clone(),
            maker_id: self.maker_id.clone(),
            maker_address: parse_optional_address("rfq.maker_address", self.rfq.maker_address.as_deref())?,
            headers: self
                .rfq
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            heartbeat_interval_ms: self.rfq.heartbeat_interval_ms,
            reconnect_base_delay_ms: self.rfq.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.rfq.reconnect_max_delay_ms,
            quote_validity_secs: self.rfq.quote_validity_secs,
        })
    }

    pub fn broadcast(&self) -> AppResult<BroadcastConfig> {
        Ok(BroadcastConfig {
            chain_id: self.chain_id,
            maker_id: self.maker_id.clone(),
            interval_ms: self.broadcast.interval_ms,
            initial_delay_ms: self.broadcast.initial_delay_ms,
            max_spread_bps: self.broadcast.max_spread_bps,
            quote_token: parse_address("broadcast.quote_token", &self.broadcast.quote_token)?,
            quote_decimals: self.broadcast.quote_decimals,
            level_size: self.broadcast.level_size,
        })
    }

    pub fn relay(&self) -> RelayConfig {
        RelayConfig {
            venues: self.relay.venues.clone(),
            ..Default::default()
        }
    }

    pub fn distribution(&self) -> AppResult<DistributionConfig> {
        let tracked_tokens = self
            .relay
            .tracked_tokens
            .iter()
            .map(|t| parse_address("relay.tracked_tokens", t))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(DistributionConfig {
            port: self.relay.port,
            ping_interval_ms: self.relay.ping_interval_ms,
            max_connections: self.relay.max_connections,
            dedup_retention_ms: self.relay.dedup_retention_ms,
            cleanup_interval_ms: self.relay.cleanup_interval_ms,
            tracked_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        maker_id = "maker-1"
        [rfq]
        url = "wss://rfq.example/ws"
        [broadcast]
        quote_token = "0x0505050505050505050505050505050505050505"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.pricer.backend, PricerBackend::Model);
        assert_eq!(config.spot.sources.len(), 3);
        assert_eq!(config.spot.staleness_ms, 5_000);
        assert_eq!(config.exchange.staleness_ms, 60_000);
        assert_eq!(config.rfq.quote_validity_secs, 30);
        assert!(config.broadcast.enabled);
        assert!(!config.relay.enabled);
        assert_eq!(config.discovery_refresh_secs, 0);
        assert_eq!(config.signing.key_env, DEFAULT_SIGNING_KEY_ENV);

        let rfq = config.rfq_client().unwrap();
        assert_eq!(rfq.maker_id, "maker-1");
        assert!(rfq.maker_address.is_none());
        assert_eq!(config.broadcast().unwrap().quote_token, Address::repeat_byte(0x05));
    }

    #[test]
    fn test_required_fields() {
        assert!(matches!(AppConfig::from_toml(""), Err(AppError::Config(_))));
        let bad_token = MINIMAL.replace("0x0505050505050505050505050505050505050505", "0x12");
        assert!(AppConfig::from_toml(&bad_token).is_err());
    }

    #[test]
    fn test_full_sections() {
        let toml = r#"
            chain_id = 42161
            maker_id = "maker-1"
            discovery_refresh_secs = 600

            [rfq]
            url = "wss://rfq.example/ws"

            [broadcast]
            quote_token = "0x0505050505050505050505050505050505050505"

            [pricer]
            backend = "exchange"
            spread_override = 0.03
            volatilities = { eth = 0.7 }

            [relay]
            enabled = true
            tracked_tokens = ["0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"]

            [[relay.venues]]
            name = "venue-a"
            chain_id = 42161
            url = "wss://venue-a.example/ws"

            [[options]]
            address = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
            underlying = "ETH"
            strike = "3000000000000000000000"
            expiry = 1900000000
            collateral = "0xcccccccccccccccccccccccccccccccccccccccc"
        "#;
        let config = AppConfig::from_toml(toml).unwrap();

        assert_eq!(config.chain_id, 42161);
        assert_eq!(config.discovery_refresh_secs, 600);
        assert_eq!(config.pricer.backend, PricerBackend::Exchange);
        assert_eq!(config.pricer.exchange().spread_override, Some(0.03));
        assert_eq!(config.pricer.model().volatilities.get("ETH"), Some(&0.7));

        let distribution = config.distribution().unwrap();
        assert_eq!(distribution.tracked_tokens, vec![Address::repeat_byte(0xa1)]);
        assert_eq!(config.relay().venues[0].chain_id, 42161);

        let params = config.options[0].to_params().unwrap();
        assert_eq!(params.address, Address::repeat_byte(0xa1));
        assert_eq!(params.redemption, Address::ZERO);
        assert!(!params.is_put);
        assert_eq!(params.decimals, 18);
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.options.len(), 1);
        assert!(config.options[0].to_params().is_ok());
        assert!(config.signing.key_file.is_none());
    }

    #[test]
    fn test_key_source() {
        let mut signing = SigningConfig {
            key_env: "OPTMAKER_TEST_SIGNING_KEY_UNSET".to_string(),
            ..Default::default()
        };
        assert!(signing.key_source().is_none());

        signing.key_file = Some(PathBuf::from("/run/secrets/maker.key"));
        assert!(matches!(signing.key_source(), Some(KeySource::File { .. })));
    }

    const SIGNED_BASE: &str = r#"
        maker_id = "maker-1"
        [rfq]
        url = "wss://rfq.example/ws"
        [broadcast]
        enabled = false
        [signing]
        key_file = "/run/secrets/maker.key"
    "#;

    #[test]
    fn test_configured_key_requires_settlement_address() {
        let missing = AppConfig::from_toml(SIGNED_BASE);
        assert!(matches!(missing, Err(AppError::Config(msg)) if msg.contains("settlement_address")));

        let zero = format!("{SIGNED_BASE}settlement_address = \"0x0000000000000000000000000000000000000000\"\n");
        assert!(matches!(AppConfig::from_toml(&zero), Err(AppError::Config(_))));

        let garbage = format!("{SIGNED_BASE}settlement_address = \"0x1234\"\n");
        assert!(matches!(AppConfig::from_toml(&garbage), Err(AppError::Config(_))));

        let good = format!("{SIGNED_BASE}settlement_address = \"0x7777777777777777777777777777777777777777\"\n");
        let config = AppConfig::from_toml(&good).unwrap();
        assert_eq!(config.signing.settlement().unwrap(), Address::repeat_byte(0x77));
    }

    #[test]
    fn test_settlement_not_required_without_key() {
        let config = AppConfig::from_toml(
            r#"
            maker_id = "maker-1"
            [rfq]
            url = "wss://rfq.example/ws"
            [broadcast]
            enabled = false
            [signing]
            key_env = "OPTMAKER_TEST_SIGNING_KEY_UNSET"
            "#,
        )
        .unwrap();
        assert!(config.signing.key_source().is_none());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let base = r#"
            maker_id = "maker-1"
            [rfq]
            url = "wss://rfq.example/ws"
        "#;
        let spot = format!("{base}[broadcast]\nenabled = false\n[spot]\npoll_interval_ms = 0\n");
        assert!(matches!(AppConfig::from_toml(&spot), Err(AppError::Config(msg)) if msg.contains("poll_interval_ms")));

        let broadcast = format!(
            "{base}[broadcast]\nquote_token = \"0x0505050505050505050505050505050505050505\"\ninterval_ms = 0\n"
        );
        assert!(matches!(AppConfig::from_toml(&broadcast), Err(AppError::Config(msg)) if msg.contains("interval_ms")));
    }

    #[test]
    fn test_resolve_path_prefers_cli() {
        assert_eq!(AppConfig::resolve_path(Some("custom.toml".to_string())), "custom.toml");
    }
}
