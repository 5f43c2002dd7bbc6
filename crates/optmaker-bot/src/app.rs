//! Main application orchestration.
//!
//! Startup, in order:
//! - option discovery (fatal if nothing is found)
//! - pricer backend selected by configuration (exchange: instrument
//!   discovery, fatal if empty)
//! - option registration (fatal if no option has a price source)
//! - signing key, RFQ client, price broadcaster, optional relay
//!
//! Every long-lived task shares one `CancellationToken`; Ctrl-C cancels it.
//! A task the process cannot quote without (RFQ client, exchange feed,
//! broadcast connection, relay, distribution server) reports its failure on
//! a fatal channel. That cancels everything and `run` returns the error.

use crate::config::{parse_address, AppConfig, PricerBackend};
use crate::discovery::{register_options, OptionDiscovery, StaticDiscovery};
use crate::error::{AppError, AppResult};
use futures_util::future::join_all;
use optmaker_core::{Clock, OptionParams, SystemClock};
use optmaker_feed::{
    ExchangeFeed, InstrumentClient, SpotCache, SpotPoller, SpotPollerConfig, SpotSource, TickerCache,
};
use optmaker_pricer::{ExchangePricer, ModelPricer, Pricer};
use optmaker_relay::{DistributionServer, Distributor, MarketDataRelay, RelayCache, TokenFilter};
use optmaker_rfq::{KeyManager, PriceBroadcaster, QuoteSigner, RfqClient, MAKER_ID_HEADER};
use optmaker_telemetry::Metrics;
use optmaker_ws::{ConnectionConfig, ConnectionManager, WsWriteHandle};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long tasks get to wind down after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const DISTRIBUTION_CHANNEL_CAPACITY: usize = 4096;
const FATAL_CHANNEL_CAPACITY: usize = 8;

/// Where critical tasks report the error that stopped them.
type FatalTx = mpsc::Sender<AppError>;

/// Spawn a task whose failure stops the application.
fn spawn_critical<F, E>(tasks: &mut Vec<JoinHandle<()>>, fatal: &FatalTx, name: &'static str, task: F)
where
    F: std::future::Future<Output = Result<(), E>> + Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    let fatal = fatal.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = task.await {
            let e: AppError = e.into();
            error!(task = name, error = %e, "Critical task stopped");
            let _ = fatal.send(e).await;
        }
    }));
}

/// The pricer plus the feed that keeps it fresh.
enum Backend {
    Model {
        pricer: Arc<ModelPricer>,
        spot: Arc<SpotCache>,
        poller: Arc<SpotPoller>,
        sources: Vec<SpotSource>,
    },
    Exchange {
        pricer: Arc<ExchangePricer>,
        feed: Arc<ExchangeFeed>,
    },
}

impl Backend {
    fn pricer(&self) -> Arc<dyn Pricer> {
        match self {
            Self::Model { pricer, .. } => pricer.clone() as Arc<dyn Pricer>,
            Self::Exchange { pricer, .. } => pricer.clone() as Arc<dyn Pricer>,
        }
    }

    /// Subscribe the feed to whatever the pricer has mapped so far.
    async fn sync_subscriptions(&self) {
        if let Self::Exchange { pricer, feed } = self {
            feed.subscribe(pricer.mapped_instruments()).await;
        }
    }
}

/// Connections and caches reported on the stats tick.
struct Monitored {
    pricer: Arc<dyn Pricer>,
    connections: Vec<Arc<ConnectionManager>>,
    relay_cache: Option<Arc<RelayCache>>,
}

pub struct Application<D: OptionDiscovery = StaticDiscovery> {
    config: AppConfig,
    discovery: Arc<D>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Application<StaticDiscovery> {
    /// Application over the options listed in the configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let discovery = StaticDiscovery::from_entries(&config.options)?;
        Ok(Self::with_discovery(config, discovery))
    }
}

impl<D: OptionDiscovery> Application<D> {
    pub fn with_discovery(config: AppConfig, discovery: D) -> Self {
        Self {
            config,
            discovery: Arc::new(discovery),
            clock: Arc::new(SystemClock),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the application.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn discover(&self) -> AppResult<Vec<OptionParams>> {
        let options = self.discovery.discover().await?;
        if options.is_empty() {
            return Err(AppError::Startup("option discovery returned no options".to_string()));
        }
        info!(count = options.len(), "Options discovered");
        Ok(options)
    }

    async fn build_backend(&self, options: &[OptionParams]) -> AppResult<Backend> {
        match self.config.pricer.backend {
            PricerBackend::Model => {
                let symbols: Vec<String> = if self.config.spot.symbols.is_empty() {
                    options
                        .iter()
                        .map(|o| o.underlying.to_uppercase())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect()
                } else {
                    self.config.spot.symbols.iter().map(|s| s.to_uppercase()).collect()
                };
                let spot = Arc::new(SpotCache::new(self.config.spot.staleness_ms, self.clock.clone()));
                let poller = SpotPoller::new(
                    SpotPollerConfig {
                        sources: self.config.spot.sources.clone(),
                        symbols: symbols.clone(),
                        interval: Duration::from_millis(self.config.spot.poll_interval_ms),
                    },
                    spot.clone(),
                )?;
                let pricer = ModelPricer::new(self.config.pricer.model(), spot.clone(), symbols, self.clock.clone())?;
                Ok(Backend::Model {
                    pricer: Arc::new(pricer),
                    spot,
                    poller: Arc::new(poller),
                    sources: self.config.spot.sources.iter().map(|s| s.kind).collect(),
                })
            }
            PricerBackend::Exchange => {
                let client = InstrumentClient::new(self.config.exchange.rest_url.clone())?;
                let index = client.fetch_all(&self.config.exchange.currencies).await?;
                if index.is_empty() {
                    return Err(AppError::Startup("exchange returned no option instruments".to_string()));
                }
                info!(instruments = index.len(), "Exchange instruments discovered");
                let tickers = Arc::new(TickerCache::new(self.config.exchange.staleness_ms, self.clock.clone()));
                let pricer = ExchangePricer::new(self.config.pricer.exchange(), index, tickers.clone(), self.clock.clone());
                let feed = ExchangeFeed::new(self.config.exchange.feed(), tickers, self.shutdown.child_token());
                Ok(Backend::Exchange {
                    pricer: Arc::new(pricer),
                    feed: Arc::new(feed),
                })
            }
        }
    }

    fn load_signer(&self) -> AppResult<Option<Arc<QuoteSigner>>> {
        let signing = &self.config.signing;
        let Some(source) = signing.key_source() else {
            warn!(env_var = %signing.key_env, "No signing key configured, quotes will be unsigned");
            return Ok(None);
        };
        let expected = signing
            .expected_address
            .as_deref()
            .map(|a| parse_address("signing.expected_address", a))
            .transpose()?;
        let settlement = signing.settlement()?;
        let keys = KeyManager::load(&source, expected)?;
        let signer = QuoteSigner::new(keys, u64::from(self.config.chain_id), settlement);
        info!(maker = %signer.address(), chain_id = self.config.chain_id, "Quote signer loaded");
        Ok(Some(Arc::new(signer)))
    }

    /// Sibling connection for a dedicated broadcast endpoint. Inbound frames
    /// are drained and dropped.
    fn spawn_broadcast_connection(
        &self,
        url: &str,
        tasks: &mut Vec<JoinHandle<()>>,
        fatal: &FatalTx,
    ) -> Arc<ConnectionManager> {
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let ws_config = ConnectionConfig {
            name: "broadcast".to_string(),
            url: url.to_string(),
            headers: vec![(MAKER_ID_HEADER.to_string(), self.config.maker_id.clone())],
            heartbeat_interval_ms: self.config.rfq.heartbeat_interval_ms,
            reconnect_base_delay_ms: self.config.rfq.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.config.rfq.reconnect_max_delay_ms,
            ..Default::default()
        };
        let manager = Arc::new(
            ConnectionManager::new(ws_config, event_tx).with_shutdown_token(self.shutdown.child_token()),
        );
        {
            let manager = manager.clone();
            spawn_critical(tasks, fatal, "broadcast", async move { manager.connect().await });
        }
        tasks.push(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(?event, "Broadcast connection event");
            }
        }));
        manager
    }

    fn spawn_relay(
        &self,
        tasks: &mut Vec<JoinHandle<()>>,
        fatal: &FatalTx,
    ) -> AppResult<(Arc<RelayCache>, Vec<Arc<ConnectionManager>>)> {
        let distribution = self.config.distribution()?;
        let cache = Arc::new(RelayCache::new(self.config.relay.staleness_ms, self.clock.clone()));
        let relay = Arc::new(MarketDataRelay::new(self.config.relay(), cache.clone(), self.shutdown.clone()));
        let (out_tx, _) = broadcast::channel(DISTRIBUTION_CHANNEL_CAPACITY);
        let distributor = Arc::new(Distributor::new(
            TokenFilter::new(distribution.tracked_tokens.iter().copied()),
            out_tx.clone(),
            self.clock.clone(),
        ));
        let cleanup_interval = Duration::from_millis(distribution.cleanup_interval_ms.max(1));
        let retention_ms = distribution.dedup_retention_ms;
        let server = Arc::new(DistributionServer::new(distribution, cache.clone(), out_tx, self.clock.clone()));
        let connections: Vec<_> = relay.connections().cloned().collect();

        {
            let events = relay.subscribe();
            let shutdown = self.shutdown.clone();
            tasks.push(tokio::spawn(async move {
                distributor.run(events, cleanup_interval, retention_ms, shutdown).await;
            }));
        }
        {
            let relay = relay.clone();
            spawn_critical(tasks, fatal, "relay", async move { relay.run().await });
        }
        {
            let shutdown = self.shutdown.clone();
            spawn_critical(tasks, fatal, "distribution", async move { server.run(shutdown).await });
        }
        info!(venues = connections.len(), port = self.config.relay.port, "Market-data relay started");
        Ok((cache, connections))
    }

    fn report_stats(&self, backend: &Backend, monitored: &Monitored) {
        let registered = monitored.pricer.registry().len();
        let quotable = monitored.pricer.quotable_count();
        Metrics::options(registered, quotable);
        for connection in &monitored.connections {
            Metrics::ws_state_set(connection.name(), connection.state().as_str());
            Metrics::ws_reconnect_attempts(connection.name(), connection.reconnect_count());
        }
        let relay_pairs = monitored.relay_cache.as_ref().map_or(0, |c| c.len());

        match backend {
            Backend::Model {
                spot, poller, sources, ..
            } => {
                for source in sources {
                    Metrics::spot_source_failures(source.as_str(), poller.failure_count(*source));
                }
                info!(
                    pricer = monitored.pricer.name(),
                    registered,
                    quotable,
                    spot_symbols = spot.len(),
                    relay_pairs,
                    "Stats"
                );
            }
            Backend::Exchange { pricer, feed } => {
                info!(
                    pricer = monitored.pricer.name(),
                    registered,
                    quotable,
                    unquotable = pricer.unquotable_count(),
                    subscribed = feed.subscribed_count(),
                    tickers = feed.cache().len(),
                    relay_pairs,
                    "Stats"
                );
            }
        }
    }

    async fn refresh_options(&self, backend: &Backend) {
        match self.discovery.discover().await {
            Ok(options) => {
                let pricer = backend.pricer();
                let summary = register_options(pricer.as_ref(), &options, self.clock.as_ref());
                if summary.registered > 0 {
                    backend.sync_subscriptions().await;
                }
            }
            Err(e) => warn!(error = %e, "Option refresh failed"),
        }
    }

    /// Wire everything and run until shutdown.
    ///
    /// # Errors
    /// Startup failures (no options, no exchange instruments, no quotable
    /// option, bad signing key or configuration) and the failure of any
    /// critical task, including a first connection that never opens.
    pub async fn run(self) -> AppResult<()> {
        let options = self.discover().await?;
        let backend = self.build_backend(&options).await?;
        let pricer = backend.pricer();

        register_options(pricer.as_ref(), &options, self.clock.as_ref());
        let quotable = pricer.quotable_count();
        if quotable == 0 {
            return Err(AppError::Startup(
                "no registered option is matched to a price source".to_string(),
            ));
        }
        info!(
            pricer = pricer.name(),
            registered = pricer.registry().len(),
            quotable,
            "Pricer ready"
        );

        let signer = self.load_signer()?;
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut connections: Vec<Arc<ConnectionManager>> = Vec::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(FATAL_CHANNEL_CAPACITY);

        match &backend {
            Backend::Model { poller, .. } => {
                poller.poll_once().await;
                let poller = poller.clone();
                let shutdown = self.shutdown.clone();
                tasks.push(tokio::spawn(async move { poller.run(shutdown).await }));
            }
            Backend::Exchange { feed, .. } => {
                backend.sync_subscriptions().await;
                connections.push(feed.connection().clone());
                let feed = feed.clone();
                spawn_critical(&mut tasks, &fatal_tx, "exchange_feed", async move { feed.run().await });
            }
        }

        let client = Arc::new(RfqClient::new(
            self.config.rfq_client()?,
            pricer.clone(),
            signer,
            self.clock.clone(),
            self.shutdown.child_token(),
        ));
        connections.push(client.connection().clone());
        {
            let client = client.clone();
            spawn_critical(&mut tasks, &fatal_tx, "rfq", async move { client.run().await });
        }

        if self.config.broadcast.enabled {
            let write: WsWriteHandle = match self.config.broadcast.url.as_deref() {
                Some(url) => {
                    let manager = self.spawn_broadcast_connection(url, &mut tasks, &fatal_tx);
                    connections.push(manager.clone());
                    manager.write_handle()
                }
                None => client.write_handle(),
            };
            let broadcaster = PriceBroadcaster::new(self.config.broadcast()?, pricer.clone(), write);
            let shutdown = self.shutdown.clone();
            tasks.push(tokio::spawn(async move { broadcaster.run(shutdown).await }));
        }

        let relay_cache = if self.config.relay.enabled {
            let (cache, relay_connections) = self.spawn_relay(&mut tasks, &fatal_tx)?;
            connections.extend(relay_connections);
            Some(cache)
        } else {
            None
        };

        let monitored = Monitored {
            pricer,
            connections,
            relay_cache,
        };

        let mut stats = tokio::time::interval(Duration::from_secs(self.config.stats_interval_secs.max(1)));
        let refresh_period = Duration::from_secs(self.config.discovery_refresh_secs.max(1));
        let mut refresh = tokio::time::interval_at(tokio::time::Instant::now() + refresh_period, refresh_period);
        let refresh_enabled = self.config.discovery_refresh_secs > 0;

        info!("Application running");
        let mut failure = None;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(e) = fatal_rx.recv() => {
                    error!(error = %e, "Critical task failed, shutting down");
                    self.shutdown.cancel();
                    failure = Some(e);
                    break;
                }
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Shutdown signal received"),
                        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                    }
                    self.shutdown.cancel();
                    break;
                }
                _ = stats.tick() => self.report_stats(&backend, &monitored),
                _ = refresh.tick(), if refresh_enabled => self.refresh_options(&backend).await,
            }
        }

        info!(tasks = tasks.len(), "Shutting down");
        if tokio::time::timeout(SHUTDOWN_GRACE, join_all(tasks)).await.is_err() {
            warn!("Tasks did not stop within the grace period");
        }
        match failure {
            Some(e) => Err(e),
            None => {
                info!("Shutdown complete");
                Ok(())
            }
        }
    }
}
