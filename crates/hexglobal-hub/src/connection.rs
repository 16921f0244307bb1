use crate::error::HubError;
use crate::metrics::{counters, gauges};
use crate::registry::{ClientHandle, ClientId, ClientQueue};
use crate::server::ServerState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hexglobal_common::types::WS_PATH;
use hexglobal_common::Event;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

/// How long a departing client gets to take the Close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Keeps a client registered for as long as it lives.
struct Registration {
    state: Arc<ServerState>,
    id: ClientId,
}

impl Registration {
    fn new(state: Arc<ServerState>, handle: ClientHandle) -> Self {
        let id = handle.id;
        state.registry.register(handle);
        gauges::clients_connected(state.registry.len());
        Self { state, id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // No-op if the broadcaster already evicted this client.
        if self.state.registry.unregister(self.id).is_some() {
            gauges::clients_connected(self.state.registry.len());
        }
    }
}

fn check_path(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    if req.uri().path() == WS_PATH {
        return Ok(resp);
    }
    let mut not_found = ErrorResponse::new(Some("not found".to_string()));
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    Err(not_found)
}

fn decode(msg: &Message) -> Option<Result<Event, HubError>> {
    let event = match msg {
        Message::Text(text) => Event::from_json(text),
        Message::Binary(data) => Event::from_slice(data),
        _ => return None,
    };
    Some(event.map_err(HubError::MalformedEvent))
}

/// Pump one client: inbound events go onto the event queue, frames queued by
/// the broadcaster go out over the socket.
///
/// Returns `Ok` when the peer closes or the client is evicted. Eviction also
/// cuts short a write blocked on a peer that has stopped reading. Any read,
/// write or decode error ends the session with `Err`.
async fn run_session(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    queue: &mut ClientQueue,
    events: &mpsc::UnboundedSender<Event>,
    id: ClientId,
) -> Result<(), HubError> {
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return Err(HubError::WebSocket(e)),
                };
                // Ping, Pong and raw frames are answered by the transport.
                let Some(event) = decode(&msg) else { continue };
                let event = event?;
                info!(client = id, username = %event.username, message_len = event.message.len(), "event received");
                counters::events_received_total();
                events.send(event).map_err(|_| HubError::QueueClosed)?;
            }
            frame = queue.frames.recv() => {
                let Some(frame) = frame else {
                    debug!(client = id, "outbound queue closed");
                    return Ok(());
                };
                tokio::select! {
                    sent = ws_tx.send(frame) => sent?,
                    _ = &mut queue.evicted => {
                        debug!(client = id, "evicted during write");
                        return Ok(());
                    }
                }
            }
            _ = &mut queue.evicted => {
                debug!(client = id, "evicted by broadcaster");
                return Ok(());
            }
        }
    }
}

/// Upgrade a raw TCP connection on [`WS_PATH`], register it and serve it until
/// it ends. The client is unregistered on every exit path.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), HubError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_message_size),
        max_frame_size: Some(state.config.max_message_size),
        ..WebSocketConfig::default()
    };

    let ws_stream =
        tokio_tungstenite::accept_hdr_async_with_config(stream, check_path, Some(ws_config))
            .await
            .map_err(|e| {
                debug!(peer = %peer_addr, error = %e, "websocket handshake failed");
                HubError::WebSocket(e)
            })?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let id = state.registry.next_id();
    let (handle, mut queue) = ClientHandle::new(id, peer_addr, state.config.client_buffer);
    let registration = Registration::new(Arc::clone(&state), handle);
    let connected_at = Instant::now();
    info!(client = id, peer = %peer_addr, "client connected");

    let result = run_session(&mut ws_tx, &mut ws_rx, &mut queue, &state.events, id).await;

    drop(registration);
    let duration_secs = connected_at.elapsed().as_secs();
    match &result {
        Ok(()) => info!(client = id, duration_secs, "client disconnected"),
        Err(e) => info!(client = id, duration_secs, error = %e, "client dropped"),
    }
    // Sends Close. A peer that is not reading cannot hold the task past the
    // grace period; dropping the socket then ends the connection.
    if tokio::time::timeout(CLOSE_GRACE, ws_tx.close()).await.is_err() {
        debug!(client = id, "close handshake timed out");
    }

    result
}
