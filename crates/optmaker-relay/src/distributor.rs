//! Central distribution loop.
//!
//! Every relay event passes the tracked-token filter and the dedup check
//! before it is offered to subscribers. The loop never waits on a client.

use crate::dedup::Deduplicator;
use crate::event::PriceEvent;
use optmaker_core::{Address, Clock};
use optmaker_telemetry::Metrics;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tokens of interest. Empty means every token.
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    tokens: HashSet<Address>,
}

impl TokenFilter {
    pub fn new(tokens: impl IntoIterator<Item = Address>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn allows(&self, event: &PriceEvent) -> bool {
        self.tokens.is_empty() || self.tokens.iter().any(|t| event.involves(t))
    }
}

pub struct Distributor {
    filter: TokenFilter,
    dedup: Deduplicator,
    out: broadcast::Sender<Arc<PriceEvent>>,
    clock: Arc<dyn Clock>,
}

impl Distributor {
    pub fn new(filter: TokenFilter, out: broadcast::Sender<Arc<PriceEvent>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            filter,
            dedup: Deduplicator::new(),
            out,
            clock,
        }
    }

    pub fn filter(&self) -> &TokenFilter {
        &self.filter
    }

    /// Filter, dedup and fan out one event. Returns whether it was forwarded.
    pub fn process(&self, event: Arc<PriceEvent>) -> bool {
        if !self.filter.allows(&event) {
            return false;
        }
        if !self.dedup.should_forward(&event, self.clock.now_ms()) {
            Metrics::dedup_suppressed();
            return false;
        }
        // no subscribers is fine
        let _ = self.out.send(event);
        true
    }

    pub fn cleanup(&self, retention_ms: i64) -> usize {
        self.dedup.cleanup(self.clock.now_ms(), retention_ms)
    }

    /// Consume relay events until shutdown, cleaning the dedup table on
    /// `cleanup_interval`.
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<Arc<PriceEvent>>,
        cleanup_interval: Duration,
        retention_ms: i64,
        shutdown: CancellationToken,
    ) {
        let mut cleanup = tokio::time::interval(cleanup_interval);
        cleanup.tick().await;
        info!("Distribution loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cleanup.tick() => {
                    let removed = self.cleanup(retention_ms);
                    if removed > 0 {
                        debug!(removed, "Dedup entries expired");
                    }
                }
                result = events.recv() => match result {
                    Ok(event) => {
                        self.process(event);
                    }
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Distribution loop lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("Distribution loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use optmaker_core::ManualClock;

    fn event(base: u8, bid: f64) -> Arc<PriceEvent> {
        Arc::new(PriceEvent::new(
            1,
            Address::repeat_byte(base),
            Address::repeat_byte(0x05),
            vec![Level(bid, 1.0)],
            vec![Level(bid + 1.0, 1.0)],
            0,
        ))
    }

    fn distributor(tokens: Vec<Address>) -> (Distributor, broadcast::Receiver<Arc<PriceEvent>>) {
        let (tx, rx) = broadcast::channel(16);
        let clock = Arc::new(ManualClock::new(0));
        (Distributor::new(TokenFilter::new(tokens), tx, clock), rx)
    }

    #[test]
    fn test_untracked_pairs_dropped() {
        let (dist, mut rx) = distributor(vec![Address::repeat_byte(0xaa)]);
        assert!(!dist.process(event(0xbb, 10.0)));
        assert!(dist.process(event(0xaa, 10.0)));
        assert_eq!(rx.try_recv().unwrap().base, Address::repeat_byte(0xaa));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_events_forwarded_once() {
        let (dist, mut rx) = distributor(vec![]);
        assert!(dist.process(event(0xaa, 10.0)));
        assert!(!dist.process(event(0xaa, 10.0)));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let (dist, mut rx) = distributor(vec![]);
        let (relay_tx, relay_rx) = broadcast::channel(16);
        let shutdown = CancellationToken::new();
        let dist = Arc::new(dist);
        let task = {
            let dist = dist.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                dist.run(relay_rx, Duration::from_secs(60), 300_000, shutdown).await
            })
        };
        relay_tx.send(event(0xaa, 10.0)).unwrap();
        relay_tx.send(event(0xaa, 10.0)).unwrap();
        relay_tx.send(event(0xaa, 12.0)).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.best_bid(), Some(10.0));
        assert_eq!(second.best_bid(), Some(12.0));

        shutdown.cancel();
        task.await.unwrap();
    }
}
