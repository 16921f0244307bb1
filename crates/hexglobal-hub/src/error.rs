use hexglobal_common::EventError;
use thiserror::Error;

/// Errors that end a single client session or stop the accept loop.
#[derive(Error, Debug)]
pub enum HubError {
    /// WebSocket handshake or transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The client sent a frame that does not decode as an event.
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] EventError),
    /// The broadcaster is no longer draining the event queue.
    #[error("event queue closed")]
    QueueClosed,
}
