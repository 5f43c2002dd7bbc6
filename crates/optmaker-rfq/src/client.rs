//! RFQ network client.
//!
//! One long-lived connection. Every inbound request is answered with exactly
//! one quote or decline; nothing a counterparty sends can stop the loop.

use crate::error::{RfqError, RfqResult};
use crate::messages::{encode_decline, encode_quote, parse_inbound, Inbound, InboundRfq, QuotedLeg};
use crate::signer::{QuoteSigner, QuoteTerms};
use optmaker_core::{units_to_f64, Address, Clock};
use optmaker_pricer::{DeclineReason, Pricer, QuoteFill, RfqDecision};
use optmaker_telemetry::Metrics;
use optmaker_ws::{ConnectionConfig, ConnectionManager, WsEvent, WsWriteHandle};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handshake header carrying the maker identity.
pub const MAKER_ID_HEADER: &str = "X-Maker-Id";

#[derive(Debug, Clone)]
pub struct RfqClientConfig {
    pub url: String,
    pub maker_id: String,
    /// Maker address put on unsigned quotes. Ignored when a signer is set.
    pub maker_address: Option<Address>,
    /// Extra handshake headers (API keys).
    pub headers: Vec<(String, String)>,
    pub heartbeat_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Lifetime of an outgoing quote.
    pub quote_validity_secs: u64,
}

impl Default for RfqClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            maker_id: String::new(),
            maker_address: None,
            headers: Vec::new(),
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 300_000,
            quote_validity_secs: 30,
        }
    }
}

pub struct RfqClient {
    config: RfqClientConfig,
    pricer: Arc<dyn Pricer>,
    signer: Option<Arc<QuoteSigner>>,
    clock: Arc<dyn Clock>,
    manager: Arc<ConnectionManager>,
    write: WsWriteHandle,
    events: TokioMutex<Option<mpsc::Receiver<WsEvent>>>,
}

impl RfqClient {
    pub fn new(
        config: RfqClientConfig,
        pricer: Arc<dyn Pricer>,
        signer: Option<Arc<QuoteSigner>>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let mut headers = vec![(MAKER_ID_HEADER.to_string(), config.maker_id.clone())];
        headers.extend(config.headers.iter().cloned());
        let ws_config = ConnectionConfig {
            name: "rfq".to_string(),
            url: config.url.clone(),
            headers,
            reconnect_base_delay_ms: config.reconnect_base_delay_ms,
            reconnect_max_delay_ms: config.reconnect_max_delay_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
            ..Default::default()
        };
        let manager = ConnectionManager::new(ws_config, event_tx).with_shutdown_token(shutdown);
        let write = manager.write_handle();
        if signer.is_none() {
            warn!("No signing key configured, quotes will be sent unsigned");
        }
        Self {
            config,
            pricer,
            signer,
            clock,
            manager: Arc::new(manager),
            write,
            events: TokioMutex::new(Some(event_rx)),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Write handle of the RFQ connection, shared with the price broadcaster.
    pub fn write_handle(&self) -> WsWriteHandle {
        self.write.clone()
    }

    fn maker_address(&self) -> Address {
        self.signer
            .as_ref()
            .map(|s| s.address())
            .or(self.config.maker_address)
            .unwrap_or(Address::ZERO)
    }

    fn decline(quote_id: &str, reason: &DeclineReason) -> String {
        Metrics::rfq_declined(reason.as_str());
        encode_decline(quote_id, &reason.to_string())
    }

    /// Response to one inbound frame, if it needs one.
    pub async fn respond(&self, text: &str) -> Option<String> {
        let rfq = match parse_inbound(text) {
            Ok(Inbound::Rfq(rfq)) => rfq,
            Ok(Inbound::Other(kind)) => {
                debug!(kind = %kind, "Ignoring RFQ network message");
                return None;
            }
            Err(RfqError::InvalidMessage {
                quote_id: Some(quote_id),
                reason,
            }) => {
                Metrics::rfq_received();
                warn!(quote_id = %quote_id, reason = %reason, "Malformed RFQ, declining");
                return Some(Self::decline(&quote_id, &DeclineReason::InvalidRequest(reason)));
            }
            Err(e) => {
                warn!(error = %e, "Unparseable RFQ network frame");
                return None;
            }
        };

        Metrics::rfq_received();
        debug!(
            quote_id = %rfq.request.quote_id,
            sell = %rfq.request.sell.token,
            buy = %rfq.request.buy.token,
            "RFQ received"
        );

        match self.pricer.handle_rfq(&rfq.request) {
            RfqDecision::Quote(fill) => Some(self.quote(&rfq, &fill).await),
            RfqDecision::Decline(reason) => Some(Self::decline(&rfq.request.quote_id, &reason)),
        }
    }

    async fn quote(&self, rfq: &InboundRfq, fill: &QuoteFill) -> String {
        let quote_id = rfq.request.quote_id.as_str();
        let taker_amount = fill.taker_sell_amount();
        let maker_amount = fill.taker_buy_amount();
        if taker_amount.is_zero() || maker_amount.is_zero() {
            return Self::decline(quote_id, &DeclineReason::ZeroAmount);
        }

        let expiry = self.clock.now_secs().max(0) as u64 + self.config.quote_validity_secs;
        let maker = self.maker_address();

        let signature = match &self.signer {
            Some(signer) => {
                let terms = QuoteTerms {
                    partner_id: rfq.partner_id,
                    expiry,
                    taker: rfq.taker,
                    maker,
                    nonce: rfq.nonce,
                    taker_token: rfq.request.sell.token,
                    maker_token: rfq.request.buy.token,
                    taker_amount,
                    maker_amount,
                    receiver: rfq.receiver,
                    commands: rfq.commands.clone(),
                };
                match signer.sign_hex(&terms).await {
                    Ok(sig) => Some(sig),
                    Err(e) => {
                        warn!(quote_id = %quote_id, error = %e, "Quote signing failed");
                        return Self::decline(quote_id, &DeclineReason::SigningFailed);
                    }
                }
            }
            None => {
                warn!(quote_id = %quote_id, "Sending unsigned quote");
                Metrics::rfq_unsigned();
                None
            }
        };

        let taker_units = units_to_f64(taker_amount, rfq.request.sell.decimals.into());
        let maker_units = units_to_f64(maker_amount, rfq.request.buy.decimals.into());
        let sell = QuotedLeg {
            amount: taker_amount,
            price: taker_units / maker_units,
        };
        let buy = QuotedLeg {
            amount: maker_amount,
            price: maker_units / taker_units,
        };

        Metrics::rfq_quoted();
        info!(
            quote_id = %quote_id,
            option = %fill.option,
            side = ?fill.side,
            price = fill.price,
            taker_amount = %taker_amount,
            maker_amount = %maker_amount,
            signed = signature.is_some(),
            "Quoting RFQ"
        );
        encode_quote(rfq.echo.clone(), maker, expiry, &sell, &buy, signature)
    }

    async fn handle_event(&self, event: WsEvent) {
        match event {
            WsEvent::Connected => info!(maker_id = %self.config.maker_id, "RFQ session open"),
            WsEvent::Text(text) => {
                if let Some(response) = self.respond(&text).await {
                    if let Err(e) = self.write.send_text(response).await {
                        warn!(error = %e, "Failed to send RFQ response");
                    }
                }
            }
            WsEvent::Binary(_) => debug!("Ignoring binary RFQ frame"),
            WsEvent::Disconnected => warn!("RFQ session closed"),
        }
    }

    /// Connect and answer requests until shutdown.
    ///
    /// # Errors
    /// Fails if the initial connection fails, or if called twice.
    pub async fn run(&self) -> RfqResult<()> {
        let mut events = self.events.lock().await.take().ok_or(RfqError::AlreadyRunning)?;
        let connect = self.manager.connect();
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return result.map_err(RfqError::from),
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }
    }
}
