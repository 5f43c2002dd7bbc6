//! Multi-venue market-data relay.
//!
//! One `ConnectionManager` per venue. Binary frames are `PricingUpdate`
//! protobufs; every pair record becomes a `PriceEvent` that is cached and
//! published to observers.

use crate::cache::RelayCache;
use crate::error::{RelayError, RelayResult};
use crate::event::{Level, PriceEvent};
use crate::proto::{PairUpdate, PricingUpdate};
use futures_util::future::join_all;
use optmaker_core::Address;
use optmaker_telemetry::Metrics;
use optmaker_ws::{ConnectionConfig, ConnectionManager, WsEvent};
use prost::Message;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 4096;
const ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayVenue {
    pub name: String,
    pub chain_id: u32,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub venues: Vec<RelayVenue>,
    pub heartbeat_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 300_000,
        }
    }
}

fn address(bytes: &[u8], field: &str) -> RelayResult<Address> {
    if bytes.len() != ADDRESS_LEN {
        return Err(RelayError::InvalidRecord(format!("{field} is {} bytes", bytes.len())));
    }
    Ok(Address::from_slice(bytes))
}

fn decode_pair(chain_id: u32, pair: PairUpdate) -> RelayResult<PriceEvent> {
    Ok(PriceEvent::new(
        chain_id,
        address(&pair.base, "base")?,
        address(&pair.quote, "quote")?,
        Level::from_flat(&pair.bids),
        Level::from_flat(&pair.asks),
        pair.last_update_ts,
    ))
}

/// Decode one venue frame. Records with malformed addresses are skipped.
///
/// # Errors
/// `RelayError::Decode` if the frame is not a `PricingUpdate`.
pub fn decode_frame(chain_id: u32, data: &[u8]) -> RelayResult<Vec<PriceEvent>> {
    let update = PricingUpdate::decode(data)?;
    let mut events = Vec::with_capacity(update.pairs.len());
    for pair in update.pairs {
        match decode_pair(chain_id, pair) {
            Ok(event) => events.push(event),
            Err(e) => {
                Metrics::relay_decode_error(chain_id);
                debug!(chain_id, error = %e, "Skipping pair record");
            }
        }
    }
    Ok(events)
}

struct VenueConnection {
    venue: RelayVenue,
    manager: Arc<ConnectionManager>,
    events: TokioMutex<Option<mpsc::Receiver<WsEvent>>>,
}

pub struct MarketDataRelay {
    cache: Arc<RelayCache>,
    updates: broadcast::Sender<Arc<PriceEvent>>,
    venues: Vec<VenueConnection>,
}

impl MarketDataRelay {
    pub fn new(config: RelayConfig, cache: Arc<RelayCache>, shutdown: CancellationToken) -> Self {
        let (updates, _) = broadcast::channel(EVENT_CAPACITY);
        let venues = config
            .venues
            .into_iter()
            .map(|venue| {
                let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
                let ws_config = ConnectionConfig {
                    name: format!("relay:{}", venue.name),
                    url: venue.url.clone(),
                    headers: venue.headers.clone(),
                    reconnect_base_delay_ms: config.reconnect_base_delay_ms,
                    reconnect_max_delay_ms: config.reconnect_max_delay_ms,
                    heartbeat_interval_ms: config.heartbeat_interval_ms,
                    ..Default::default()
                };
                let manager = ConnectionManager::new(ws_config, event_tx)
                    .with_shutdown_token(shutdown.child_token());
                VenueConnection {
                    venue,
                    manager: Arc::new(manager),
                    events: TokioMutex::new(Some(event_rx)),
                }
            })
            .collect();
        Self {
            cache,
            updates,
            venues,
        }
    }

    pub fn cache(&self) -> &Arc<RelayCache> {
        &self.cache
    }

    /// Observe every decoded event. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PriceEvent>> {
        self.updates.subscribe()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Arc<ConnectionManager>> {
        self.venues.iter().map(|v| &v.manager)
    }

    /// Decode, cache and publish one frame. Returns the number of events.
    pub fn ingest(&self, chain_id: u32, data: &[u8]) -> usize {
        let events = match decode_frame(chain_id, data) {
            Ok(events) => events,
            Err(e) => {
                Metrics::relay_decode_error(chain_id);
                warn!(chain_id, error = %e, "Undecodable relay frame");
                return 0;
            }
        };
        let count = events.len();
        for event in events {
            let event = Arc::new(event);
            self.cache.update(event.clone());
            Metrics::relay_event(chain_id);
            let _ = self.updates.send(event);
        }
        count
    }

    async fn run_venue(&self, venue: &VenueConnection) -> RelayResult<()> {
        let mut events = venue.events.lock().await.take().ok_or(RelayError::AlreadyRunning)?;
        let connect = venue.manager.connect();
        tokio::pin!(connect);
        let chain_id = venue.venue.chain_id;

        loop {
            tokio::select! {
                result = &mut connect => return result.map_err(RelayError::from),
                Some(event) = events.recv() => match event {
                    WsEvent::Binary(data) => {
                        self.ingest(chain_id, &data);
                    }
                    WsEvent::Connected => info!(venue = %venue.venue.name, chain_id, "Relay venue connected"),
                    WsEvent::Disconnected => warn!(venue = %venue.venue.name, chain_id, "Relay venue disconnected"),
                    WsEvent::Text(text) => debug!(venue = %venue.venue.name, len = text.len(), "Ignoring text frame"),
                },
            }
        }
    }

    /// Run every venue connection until shutdown. A venue that cannot
    /// connect is logged and does not stop the others.
    ///
    /// # Errors
    /// Fails only when every venue stopped with an error.
    pub async fn run(&self) -> RelayResult<()> {
        let results = join_all(self.venues.iter().map(|v| async move { (v, self.run_venue(v).await) })).await;
        let mut first_error = None;
        let mut healthy = 0usize;
        for (venue, result) in results {
            match result {
                Ok(()) => healthy += 1,
                Err(e) => {
                    warn!(venue = %venue.venue.name, error = %e, "Relay venue stopped");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) if healthy == 0 => Err(e),
            _ => Ok(()),
        }
    }
}
