use crate::backoff::Backoff;
use crate::config::ClientConfig;
use futures_util::{SinkExt, StreamExt};
use hexglobal_common::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
enum ConnError {
    Fatal(anyhow::Error),
    Transient(anyhow::Error),
}

impl From<tungstenite::Error> for ConnError {
    fn from(e: tungstenite::Error) -> Self {
        match &e {
            tungstenite::Error::Url(_) => Self::Fatal(e.into()),
            tungstenite::Error::Http(resp) if resp.status().is_client_error() => {
                Self::Fatal(e.into())
            }
            _ => Self::Transient(e.into()),
        }
    }
}

/// Connection status of the hub WebSocket link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    /// Not connected to the hub.
    Disconnected,
    /// Connection or upgrade in progress.
    Connecting,
    /// Upgraded and exchanging events.
    Connected,
}

fn deliver_inbound(inbox_tx: &broadcast::Sender<Event>, msg: &Message) {
    let decoded = match msg {
        Message::Text(text) => Event::from_json(text),
        Message::Binary(data) => Event::from_slice(data),
        _ => return,
    };
    match decoded {
        Ok(event) => {
            if inbox_tx.send(event).is_err() {
                debug!("no inbox subscribers, event dropped");
            }
        }
        Err(e) => warn!(error = %e, "ignoring undecodable frame from hub"),
    }
}

/// Keep a connection to the hub alive until `outbox_rx` closes.
///
/// Outbound events are sent as Text frames; inbound events are published on
/// `inbox_tx`. A lost connection is retried with jittered exponential
/// backoff, and the attempt budget is restored after every successful
/// connection.
///
/// # Errors
///
/// Returns an error when the hub URL is unusable, the hub rejects the
/// upgrade, or `max_attempts` consecutive connection attempts fail.
pub async fn connection_manager(
    config: Arc<ClientConfig>,
    mut outbox_rx: mpsc::Receiver<Event>,
    inbox_tx: broadcast::Sender<Event>,
    status_tx: watch::Sender<ConnStatus>,
) -> anyhow::Result<()> {
    let mut backoff = Backoff::new(
        Duration::from_millis(config.reconnect.initial_delay_ms),
        Duration::from_millis(config.reconnect.max_delay_ms),
        config.reconnect.backoff_factor,
        config.reconnect.max_attempts,
    );

    loop {
        status_tx.send_replace(ConnStatus::Connecting);

        match connect_and_run(&config, &mut outbox_rx, &inbox_tx, &status_tx).await {
            Ok(()) => {
                info!("hub connection closed cleanly");
                status_tx.send_replace(ConnStatus::Disconnected);
                return Ok(());
            }
            Err(ConnError::Fatal(e)) => {
                error!(error = %e, "fatal hub error, not retrying");
                status_tx.send_replace(ConnStatus::Disconnected);
                return Err(e);
            }
            Err(ConnError::Transient(e)) => {
                let was_connected = *status_tx.borrow() == ConnStatus::Connected;
                warn!(error = %e, "hub connection lost");
                status_tx.send_replace(ConnStatus::Disconnected);
                if was_connected {
                    backoff.reset();
                }
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!(attempts = backoff.attempts(), "giving up on the hub");
            anyhow::bail!(
                "could not reach {} after {} attempts",
                config.url,
                backoff.attempts()
            );
        };
        info!(
            attempt = backoff.attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn connect_and_run(
    config: &ClientConfig,
    outbox_rx: &mut mpsc::Receiver<Event>,
    inbox_tx: &broadcast::Sender<Event>,
    status_tx: &watch::Sender<ConnStatus>,
) -> Result<(), ConnError> {
    let request = config.url.as_str().into_client_request()?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    status_tx.send_replace(ConnStatus::Connected);
    info!(url = %config.url, "connected to hub");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(frame))) => {
                        return Err(ConnError::Transient(anyhow::anyhow!(
                            "hub closed the connection: {frame:?}"
                        )));
                    }
                    Some(Ok(msg)) => deliver_inbound(inbox_tx, &msg),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(ConnError::Transient(anyhow::anyhow!(
                            "hub connection ended"
                        )));
                    }
                }
            }
            outbound = outbox_rx.recv() => {
                let Some(event) = outbound else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                };
                match event.to_json() {
                    Ok(json) => {
                        ws_tx.send(Message::Text(json)).await?;
                        debug!(message_len = event.message.len(), "event sent");
                    }
                    Err(e) => warn!(error = %e, "not sending unencodable event"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: &str) -> Event {
        Event {
            username: "alice".to_string(),
            message: message.to_string(),
            country: "X".to_string(),
            country_code: "XX".to_string(),
            latitude: 1.0,
            longitude: 2.0,
            timestamp: 1000,
        }
    }

    #[test]
    fn inbound_text_and_binary_reach_subscribers() {
        let (inbox_tx, mut inbox_rx) = broadcast::channel(8);
        let json = event("hi").to_json().unwrap();

        deliver_inbound(&inbox_tx, &Message::Text(json.clone()));
        deliver_inbound(&inbox_tx, &Message::Binary(json.into_bytes()));

        assert_eq!(inbox_rx.try_recv().unwrap(), event("hi"));
        assert_eq!(inbox_rx.try_recv().unwrap(), event("hi"));
    }

    #[test]
    fn undecodable_and_control_frames_are_skipped() {
        let (inbox_tx, mut inbox_rx) = broadcast::channel(8);

        deliver_inbound(&inbox_tx, &Message::Text("not json".to_string()));
        deliver_inbound(&inbox_tx, &Message::Ping(vec![1]));

        assert!(inbox_rx.try_recv().is_err());
    }

    #[test]
    fn delivery_without_subscribers_does_not_panic() {
        let (inbox_tx, inbox_rx) = broadcast::channel::<Event>(8);
        drop(inbox_rx);
        deliver_inbound(&inbox_tx, &Message::Text(event("hi").to_json().unwrap()));
    }

    #[test]
    fn bad_url_is_fatal() {
        let err = ConnError::from(tungstenite::Error::Url(
            tungstenite::error::UrlError::UnsupportedUrlScheme,
        ));
        assert!(matches!(err, ConnError::Fatal(_)));
    }

    #[test]
    fn io_error_is_transient() {
        let err = ConnError::from(tungstenite::Error::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionRefused,
        )));
        assert!(matches!(err, ConnError::Transient(_)));
    }

    #[tokio::test]
    async fn wss_urls_reach_the_tls_handshake() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        // Accepts TCP, then hangs up before any TLS is spoken.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let err = tokio_tungstenite::connect_async(format!("wss://{addr}/ws"))
            .await
            .unwrap_err();
        assert!(
            !matches!(
                err,
                tungstenite::Error::Url(tungstenite::error::UrlError::TlsFeatureNotEnabled)
            ),
            "{err:?}"
        );
        assert!(matches!(ConnError::from(err), ConnError::Transient(_)));
    }

    #[tokio::test]
    async fn gives_up_when_hub_is_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = ClientConfig {
            url: format!("ws://{addr}/ws"),
            ..ClientConfig::default()
        };
        config.reconnect.initial_delay_ms = 10;
        config.reconnect.max_delay_ms = 20;
        config.reconnect.max_attempts = 2;

        let (_outbox_tx, outbox_rx) = mpsc::channel(8);
        let (inbox_tx, _inbox_rx) = broadcast::channel(8);
        let (status_tx, status_rx) = watch::channel(ConnStatus::Disconnected);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            connection_manager(Arc::new(config), outbox_rx, inbox_tx, status_tx),
        )
        .await
        .expect("manager should give up");

        assert!(result.is_err());
        assert_eq!(*status_rx.borrow(), ConnStatus::Disconnected);
    }
}
