//! HexGlobal hub: rebroadcasts every event from every WebSocket client to all
//! connected clients.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Single consumer of the event queue that fans events out to clients.
pub mod broadcaster;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for hub operations.
pub mod error;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Set of live client connections.
pub mod registry;
/// Accept loop and shared server state.
pub mod server;

pub use server::{run, run_with_shutdown, ServerState};
