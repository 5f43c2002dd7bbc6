//! ConnectionManager against a local mock WebSocket server.

use futures_util::{SinkExt, StreamExt};
use optmaker_ws::{ConnectionConfig, ConnectionManager, ConnectionState, WsEvent};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

struct MockWsServer {
    addr: SocketAddr,
    connections: Arc<AtomicU32>,
    maker_headers: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockWsServer {
    /// Greets every connection with "hello" and echoes text frames.
    /// With `drop_first`, the first connection is closed right after the greeting.
    async fn start(drop_first: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let maker_headers = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));

        let conns = connections.clone();
        let headers = maker_headers.clone();
        let recv = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let n = conns.fetch_add(1, Ordering::SeqCst) + 1;
                let close_now = drop_first && n == 1;
                tokio::spawn(handle_connection(stream, headers.clone(), recv.clone(), close_now));
            }
        });

        Self {
            addr,
            connections,
            maker_headers,
            received,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

async fn handle_connection(
    stream: TcpStream,
    headers: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<String>>>,
    close_now: bool,
) {
    let mut maker = None;
    let callback = |req: &Request, resp: Response| {
        maker = req
            .headers()
            .get("x-maker-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok::<_, ErrorResponse>(resp)
    };
    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    if let Some(maker) = maker {
        headers.lock().await.push(maker);
    }

    let (mut write, mut read) = ws.split();
    let _ = write.send(Message::Text("hello".to_string())).await;
    if close_now {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                received.lock().await.push(text.clone());
                let _ = write.send(Message::Text(format!("echo:{text}"))).await;
            }
            Ok(Message::Binary(data)) => {
                let _ = write.send(Message::Binary(data)).await;
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
}

fn config(url: String) -> ConnectionConfig {
    ConnectionConfig {
        name: "test".to_string(),
        url,
        headers: vec![("x-maker-id".to_string(), "maker-1".to_string())],
        reconnect_base_delay_ms: 50,
        reconnect_max_delay_ms: 200,
        heartbeat_interval_ms: 100,
        heartbeat_timeout_ms: 1_000,
        ..Default::default()
    }
}

async fn next_event(rx: &mut mpsc::Receiver<WsEvent>) -> WsEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_send_receive_and_shutdown() {
    let server = MockWsServer::start(false).await;
    let (tx, mut rx) = mpsc::channel(64);
    let manager = Arc::new(ConnectionManager::new(config(server.url()), tx));
    let handle = manager.write_handle();

    let runner = manager.clone();
    let task = tokio::spawn(async move { runner.connect().await });

    assert_eq!(next_event(&mut rx).await, WsEvent::Connected);
    assert_eq!(next_event(&mut rx).await, WsEvent::Text("hello".to_string()));
    assert!(manager.state().is_open());

    handle.send_text("ping-me".to_string()).await.unwrap();
    assert_eq!(next_event(&mut rx).await, WsEvent::Text("echo:ping-me".to_string()));

    handle.send_binary(vec![7, 8, 9]).await.unwrap();
    assert_eq!(next_event(&mut rx).await, WsEvent::Binary(vec![7, 8, 9]));

    assert_eq!(server.maker_headers.lock().await.as_slice(), ["maker-1".to_string()]);
    assert_eq!(server.received.lock().await.as_slice(), ["ping-me".to_string()]);

    manager.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let server = MockWsServer::start(true).await;
    let (tx, mut rx) = mpsc::channel(64);
    let manager = Arc::new(ConnectionManager::new(config(server.url()), tx));

    let runner = manager.clone();
    let task = tokio::spawn(async move { runner.connect().await });

    assert_eq!(next_event(&mut rx).await, WsEvent::Connected);
    assert_eq!(next_event(&mut rx).await, WsEvent::Text("hello".to_string()));
    assert_eq!(next_event(&mut rx).await, WsEvent::Disconnected);
    assert_eq!(next_event(&mut rx).await, WsEvent::Connected);
    assert_eq!(next_event(&mut rx).await, WsEvent::Text("hello".to_string()));

    assert_eq!(server.connections.load(Ordering::SeqCst), 2);
    assert_eq!(manager.reconnect_count(), 0);

    manager.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}

#[tokio::test]
async fn test_heartbeat_keeps_session_alive() {
    let server = MockWsServer::start(false).await;
    let (tx, mut rx) = mpsc::channel(64);
    let manager = Arc::new(ConnectionManager::new(config(server.url()), tx));

    let runner = manager.clone();
    let task = tokio::spawn(async move { runner.connect().await });

    assert_eq!(next_event(&mut rx).await, WsEvent::Connected);
    // several heartbeat intervals with pongs answered by the server
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(manager.state().is_open());
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);

    manager.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}
