#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use hexglobal_common::Event;
use hexglobal_hub::config::ServerConfig;
use hexglobal_hub::server::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

type ClientStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: None,
        client_buffer: 256,
        max_message_size: 65_536,
    }
}

pub fn event(username: &str, message: &str) -> Event {
    Event {
        username: username.to_string(),
        message: message.to_string(),
        country: "X".to_string(),
        country_code: "XX".to_string(),
        latitude: 1.0,
        longitude: 2.0,
        timestamp: 1000,
    }
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<ClientStream, Message>,
    pub ws_rx: futures_util::stream::SplitStream<ClientStream>,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}/ws");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    pub async fn send_event(&mut self, event: &Event) {
        self.send_text(&event.to_json().unwrap()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn recv_event(&mut self) -> Event {
        self.recv_event_timeout(Duration::from_secs(5))
            .await
            .expect("timeout waiting for event")
    }

    pub async fn recv_event_timeout(&mut self, timeout: Duration) -> Option<Event> {
        let next = async {
            loop {
                match self.ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => return Some(Event::from_json(&text).unwrap()),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                    Some(Ok(other)) => panic!("expected text frame, got {other:?}"),
                }
            }
        };
        tokio::time::timeout(timeout, next).await.ok().flatten()
    }

    /// Wait until the server closes this connection. Returns `false` on timeout
    /// or if an event arrives first.
    pub async fn expect_closed(&mut self, timeout: Duration) -> bool {
        let closed = async {
            loop {
                match self.ws_rx.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return true,
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => return false,
                    Some(Ok(_)) => {}
                }
            }
        };
        tokio::time::timeout(timeout, closed).await.unwrap_or(false)
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
    }
}

/// Poll until the registry holds exactly `count` clients.
pub async fn wait_for_clients(state: &ServerState, count: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while state.registry.len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        waited.is_ok(),
        "expected {count} clients, registry has {}",
        state.registry.len()
    );
}

pub async fn start_server_with_config(
    configure: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    configure(&mut config);
    let (state, broadcaster) = ServerState::new(config);

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = hexglobal_hub::run(listener, state_clone, broadcaster).await {
            eprintln!("server error in test: {e}");
        }
    });

    (addr, state)
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    start_server_with_config(|_| {}).await
}

pub struct ShutdownServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub shutdown_tx: watch::Sender<()>,
    pub task: JoinHandle<()>,
}

pub async fn start_server_with_shutdown() -> ShutdownServer {
    start_server_with_shutdown_config(|_| {}).await
}

pub async fn start_server_with_shutdown_config(
    configure: impl FnOnce(&mut ServerConfig),
) -> ShutdownServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    configure(&mut config);
    let (state, broadcaster) = ServerState::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let state_clone = state.clone();
    let task = tokio::spawn(async move {
        hexglobal_hub::run_with_shutdown(listener, state_clone, broadcaster, shutdown_rx)
            .await
            .unwrap();
    });

    ShutdownServer {
        addr,
        state,
        shutdown_tx,
        task,
    }
}
