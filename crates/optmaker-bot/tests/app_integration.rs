//! Application startup checks and an end-to-end run against local mocks.

use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use optmaker_bot::{AppConfig, AppError, Application};
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const OPTION: &str = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1";
const USDC: &str = "0x0505050505050505050505050505050505050505";

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn config_toml(rfq_url: &str, spot_url: &str, spot_symbols: &str) -> String {
    format!(
        r#"
        chain_id = 42161
        maker_id = "maker-it"
        stats_interval_secs = 1

        [pricer]
        backend = "model"

        [spot]
        symbols = {spot_symbols}
        poll_interval_ms = 500
        sources = [{{ kind = "binance", base_url = "{spot_url}" }}]

        [rfq]
        url = "{rfq_url}"
        reconnect_base_delay_ms = 100

        [broadcast]
        enabled = false
        quote_token = "{USDC}"

        [signing]
        key_env = "OPTMAKER_IT_SIGNING_KEY_UNSET"

        [[options]]
        address = "{OPTION}"
        underlying = "ETH"
        strike = "3000000000000000000000"
        expiry = {expiry}
        collateral = "0xcccccccccccccccccccccccccccccccccccccccc"
        "#,
        expiry = now_secs() + 30 * 24 * 3600,
    )
}

#[tokio::test]
async fn test_no_options_is_fatal() {
    let config = AppConfig::from_toml(
        r#"
        maker_id = "maker-it"
        [rfq]
        url = "ws://127.0.0.1:1"
        [broadcast]
        enabled = false
        "#,
    )
    .unwrap();
    let result = Application::new(config).unwrap().run().await;
    assert!(matches!(result, Err(AppError::Startup(_))));
}

#[tokio::test]
async fn test_unmatched_options_are_fatal() {
    // spot is only polled for BTC, the option is on ETH
    let config = AppConfig::from_toml(&config_toml("ws://127.0.0.1:1", "http://127.0.0.1:1", r#"["BTC"]"#)).unwrap();
    let result = Application::new(config).unwrap().run().await;
    assert!(matches!(result, Err(AppError::Startup(_))));
}

#[tokio::test]
async fn test_unreachable_rfq_venue_is_fatal() {
    // nothing listens on port 1; the first handshake fails
    let config = AppConfig::from_toml(&config_toml("ws://127.0.0.1:1", "http://127.0.0.1:1", "[]")).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), Application::new(config).unwrap().run())
        .await
        .expect("application kept running without an RFQ connection");
    assert!(matches!(result, Err(AppError::Rfq(_))), "{result:?}");
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", config_toml("ws://127.0.0.1:1", "http://127.0.0.1:1", "[]")).unwrap();
    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.maker_id, "maker-it");
    assert!(matches!(AppConfig::from_file("/nonexistent/optmaker.toml"), Err(AppError::Config(_))));
}

async fn start_spot_server() -> String {
    let app = Router::new().route("/api/v3/ticker/price", get(|| async { Json(json!({"price": "3100.0"})) }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await });
    url
}

/// Single-connection RFQ venue.
async fn start_rfq_venue() -> (String, mpsc::Sender<String>, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (out_tx, mut out_rx) = mpsc::channel::<String>(16);
    let (in_tx, in_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = accept_async(stream).await else {
            return;
        };
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                Some(text) = out_rx.recv() => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = in_tx.send(text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    });
    (url, out_tx, in_rx)
}

#[tokio::test]
async fn test_end_to_end_quote() {
    let spot_url = start_spot_server().await;
    let (rfq_url, venue_out, mut venue_in) = start_rfq_venue().await;
    let config = AppConfig::from_toml(&config_toml(&rfq_url, &spot_url, "[]")).unwrap();

    let app = Application::new(config).unwrap();
    let shutdown = app.shutdown_token();
    let runner = tokio::spawn(async move { app.run().await });

    let rfq = format!(
        r#"{{"type":"rfq","msg":{{"quote_id":"q-e2e","event_id":"ev-1","partner_id":0,
        "nonce":"1","taker":"0x1111111111111111111111111111111111111111","commands":"0x",
        "sell_tokens":[{{"address":"{USDC}","decimals":6}}],
        "buy_tokens":[{{"address":"{OPTION}","amount":"1000000000000000000","decimals":18}}]}}}}"#
    );

    // the venue only forwards once the maker has connected
    let reply = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            venue_out.send(rfq.clone()).await.unwrap();
            match tokio::time::timeout(Duration::from_millis(500), venue_in.recv()).await {
                Ok(Some(text)) => return serde_json::from_str::<Value>(&text).unwrap(),
                _ => continue,
            }
        }
    })
    .await
    .expect("no reply from maker");

    assert_eq!(reply["type"], "quote");
    assert_eq!(reply["msg"]["quote_id"], "q-e2e");
    assert!(reply["msg"]["signature"].is_null());
    let usdc: u128 = reply["msg"]["sell_tokens"][0]["amount"].as_str().unwrap().parse().unwrap();
    assert!(usdc > 100_000_000 && usdc < 3_100_000_000);

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("application did not stop")
        .unwrap();
    assert!(result.is_ok());
}
