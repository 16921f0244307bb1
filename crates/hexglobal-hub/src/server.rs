use crate::broadcaster::Broadcaster;
use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::HubError;
use crate::metrics::gauges;
use crate::registry::Registry;
use hexglobal_common::types::WS_PATH;
use hexglobal_common::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How long shutdown waits for connection tasks to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the hub.
#[derive(Debug)]
pub struct ServerState {
    /// Live clients.
    pub registry: Arc<Registry>,
    /// Producer side of the event queue, cloned into every connection task.
    pub events: mpsc::UnboundedSender<Event>,
    /// Runtime server configuration.
    pub config: ServerConfig,
}

impl ServerState {
    /// Create the shared state together with the broadcaster that drains its
    /// event queue.
    #[must_use]
    pub fn new(config: ServerConfig) -> (Arc<Self>, Broadcaster) {
        let registry = Arc::new(Registry::new());
        let (events, events_rx) = mpsc::unbounded_channel();
        let broadcaster = Broadcaster::new(Arc::clone(&registry), events_rx);
        let state = Arc::new(Self {
            registry,
            events,
            config,
        });
        (state, broadcaster)
    }
}

/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run(
    listener: TcpListener,
    state: Arc<ServerState>,
    broadcaster: Broadcaster,
) -> Result<(), HubError> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    run_with_shutdown(listener, state, broadcaster, shutdown_rx).await
}

/// Run the broadcaster and the accept loop with an externally-controlled
/// shutdown signal.
///
/// When the sender behind `shutdown_rx` sends or is dropped, the accept loop stops
/// accepting, every registered client is closed, and connection tasks get up
/// to 30 seconds to finish. Events still queued are abandoned.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<ServerState>,
    broadcaster: Broadcaster,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HubError> {
    let local_addr = listener.local_addr()?;
    info!("hub listening on ws://{}{}", local_addr, WS_PATH);

    let broadcaster_task = tokio::spawn(broadcaster.run());
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&state);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                tracing::debug!("connection from {} closed: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            // Reap finished connection tasks so the set does not grow unbounded.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received, closing {} clients", state.registry.len());
                break;
            }
        }
    }

    drop(listener);
    // Dropping every handle closes each client's outbound queue, which makes
    // its connection task send Close and exit.
    drop(state.registry.drain());
    gauges::clients_connected(0);

    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while !connections.is_empty() {
        match tokio::time::timeout_at(deadline, connections.join_next()).await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "drain timeout reached with {} connections still active",
                    connections.len()
                );
                connections.abort_all();
                break;
            }
        }
    }

    broadcaster_task.abort();
    info!("hub shut down");
    Ok(())
}
