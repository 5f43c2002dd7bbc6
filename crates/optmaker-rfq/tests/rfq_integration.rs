//! RfqClient and PriceBroadcaster against a mock RFQ venue.

use futures_util::{SinkExt, StreamExt};
use optmaker_core::{Address, OptionContract, OptionKind, SystemClock};
use optmaker_feed::SpotCache;
use optmaker_pricer::{ModelPricer, ModelPricerConfig, Pricer};
use optmaker_rfq::{BroadcastConfig, LevelsSchema, PriceBroadcaster, RfqClient, RfqClientConfig};
use prost::Message as _;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

const OPTION: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
const USDC: &str = "0x0505050505050505050505050505050505050505";

/// Single-connection venue. Frames pushed into `outbound` are sent to the
/// maker; everything the maker sends comes out of `inbound`.
struct MockVenue {
    url: String,
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<Message>,
    maker_id: mpsc::Receiver<String>,
}

impl MockVenue {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (out_tx, mut out_rx) = mpsc::channel::<String>(16);
        let (in_tx, in_rx) = mpsc::channel(64);
        let (id_tx, id_rx) = mpsc::channel(4);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut maker = None;
            let callback = |req: &Request, resp: Response| {
                maker = req
                    .headers()
                    .get("x-maker-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok::<_, ErrorResponse>(resp)
            };
            let Ok(ws) = accept_hdr_async(stream, callback).await else {
                return;
            };
            if let Some(maker) = maker {
                let _ = id_tx.send(maker).await;
            }
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    Some(text) = out_rx.recv() => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    msg = read.next() => match msg {
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(msg)) => {
                            let _ = in_tx.send(msg).await;
                        }
                    }
                }
            }
        });

        Self {
            url,
            outbound: out_tx,
            inbound: in_rx,
            maker_id: id_rx,
        }
    }

    async fn next_text(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
                .await
                .expect("timed out waiting for maker frame")
                .expect("venue closed");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn next_binary(&mut self) -> Vec<u8> {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
                .await
                .expect("timed out waiting for maker frame")
                .expect("venue closed");
            if let Message::Binary(data) = msg {
                return data;
            }
        }
    }
}

fn rfq(quote_id: &str) -> String {
    format!(
        r#"{{"type":"rfq","msg":{{"quote_id":"{quote_id}","event_id":"ev-{quote_id}","partner_id":1,
        "nonce":"42","taker":"0x1111111111111111111111111111111111111111",
        "commands":"0x","fee":{{"bps":2}},
        "sell_tokens":[{{"address":"{USDC}","decimals":6}}],
        "buy_tokens":[{{"address":"{OPTION}","amount":"2000000000000000000","decimals":18}}]}}}}"#
    )
}

fn eth_call() -> OptionContract {
    OptionContract {
        address: OPTION.parse().unwrap(),
        underlying: "ETH".to_string(),
        strike: 3000.0,
        expiry: now_secs() + 30 * 24 * 3600,
        kind: OptionKind::Call,
        decimals: 18,
        collateral: Address::repeat_byte(0xcc),
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[tokio::test]
async fn test_rfq_decline_then_quote_and_broadcast() {
    let mut venue = MockVenue::start().await;
    let clock = Arc::new(SystemClock);
    let spot = Arc::new(SpotCache::new(5_000, clock.clone()));
    let pricer: Arc<dyn Pricer> = Arc::new(
        ModelPricer::new(
            ModelPricerConfig::default(),
            spot.clone(),
            vec!["ETH".to_string()],
            clock.clone(),
        )
        .unwrap(),
    );
    pricer.register_option(eth_call());

    let shutdown = CancellationToken::new();
    let client = Arc::new(RfqClient::new(
        RfqClientConfig {
            url: venue.url.clone(),
            maker_id: "maker-7".to_string(),
            ..Default::default()
        },
        pricer.clone(),
        None,
        clock,
        shutdown.clone(),
    ));
    let broadcaster = PriceBroadcaster::new(
        BroadcastConfig {
            chain_id: 42161,
            maker_id: "maker-7".to_string(),
            interval_ms: 200,
            initial_delay_ms: 100,
            // model spread on a ~300 mid is 4%
            max_spread_bps: 1_000.0,
            quote_token: USDC.parse().unwrap(),
            ..Default::default()
        },
        pricer.clone(),
        client.write_handle(),
    );

    let runner = {
        let client = client.clone();
        tokio::spawn(async move { client.run().await })
    };
    let broadcast_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { broadcaster.run(shutdown).await })
    };

    let maker_id = tokio::time::timeout(Duration::from_secs(5), venue.maker_id.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(maker_id, "maker-7");

    // no spot yet
    venue.outbound.send(rfq("q-1")).await.unwrap();
    let decline = venue.next_text().await;
    assert_eq!(decline["type"], "decline");
    assert_eq!(decline["msg"]["quote_id"], "q-1");

    spot.update("ETH", 3100.0, 3);
    venue.outbound.send(rfq("q-2")).await.unwrap();
    let quote = venue.next_text().await;
    assert_eq!(quote["type"], "quote");
    let msg = &quote["msg"];
    assert_eq!(msg["event_id"], "ev-q-2");
    assert_eq!(msg["fee"]["bps"], 2);
    assert_eq!(msg["buy_tokens"][0]["amount"], "2000000000000000000");
    let usdc_amount: u128 = msg["sell_tokens"][0]["amount"].as_str().unwrap().parse().unwrap();
    // two options at an ask well above zero and below spot
    assert!(usdc_amount > 2 * 100_000_000 && usdc_amount < 2 * 3_100_000_000);

    let frame = venue.next_binary().await;
    let levels = LevelsSchema::decode(frame.as_slice()).unwrap();
    assert_eq!(levels.chain_id, 42161);
    assert_eq!(levels.levels.len(), 1);
    assert!(levels.levels[0].bids[0] > 0.0);
    assert!(levels.levels[0].asks[0] > levels.levels[0].bids[0]);

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), runner).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), broadcast_task).await;
}
