//! HexGlobal client: a reconnecting link to the hub plus the helpers the
//! command-line client uses to build and print events.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Exponential backoff with jitter for reconnection.
pub mod backoff;
/// CLI parsing and runtime configuration.
pub mod config;
/// WebSocket hub connection manager.
pub mod connection;
/// Sender profile and event formatting.
pub mod feed;
