use clap::Parser;
use hexglobal_common::types::DEFAULT_PORT;
use std::net::{IpAddr, SocketAddr};

/// CLI arguments for the broadcast hub.
#[derive(Parser, Debug, Clone)]
#[command(name = "hexglobal-hub")]
#[command(about = "HexGlobal broadcast hub")]
#[command(version)]
pub struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0", env = "HEXGLOBAL_HOST")]
    pub host: IpAddr,
    /// Socket address for the metrics and health endpoint. Disabled when unset.
    #[arg(long, env = "HEXGLOBAL_METRICS")]
    pub metrics_addr: Option<SocketAddr>,
    /// Outbound frames buffered per client before it is evicted as stalled.
    #[arg(long, default_value = "256", env = "HEXGLOBAL_CLIENT_BUFFER")]
    pub client_buffer: usize,
    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value = "65536", env = "HEXGLOBAL_MAX_MESSAGE")]
    pub max_message_size: usize,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint, if enabled.
    pub metrics_addr: Option<SocketAddr>,
    /// Capacity of each client's outbound queue.
    pub client_buffer: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

const MAX_CLIENT_BUFFER: usize = 65_536;
const MIN_MESSAGE_SIZE: usize = 128;
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen.port() == 0 {
            return Err("port must be greater than 0".to_string());
        }

        if self.client_buffer == 0 {
            return Err("client_buffer must be greater than 0".to_string());
        }
        if self.client_buffer > MAX_CLIENT_BUFFER {
            return Err(format!(
                "client_buffer exceeds reasonable limit ({MAX_CLIENT_BUFFER})"
            ));
        }

        // An event with empty strings is ~110 bytes of JSON
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size must be at least {MIN_MESSAGE_SIZE} bytes"
            ));
        }
        if self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({MAX_MESSAGE_SIZE} bytes)"
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::from([0, 0, 0, 0]), DEFAULT_PORT),
            metrics_addr: None,
            client_buffer: 256,
            max_message_size: 65_536,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: SocketAddr::new(args.host, args.port),
            metrics_addr: args.metrics_addr,
            client_buffer: args.client_buffer,
            max_message_size: args.max_message_size,
        }
    }
}
