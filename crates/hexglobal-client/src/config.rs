use clap::Parser;
use hexglobal_common::types::{DEFAULT_PORT, UNKNOWN_COUNTRY, UNKNOWN_COUNTRY_CODE, WS_PATH};

/// CLI interface for the hub client.
#[derive(Parser, Debug)]
#[command(name = "hexglobal-client", about = "Send and watch HexGlobal events")]
#[command(version)]
pub struct Cli {
    /// WebSocket URL of the hub.
    #[arg(long, env = "HEXGLOBAL_URL", default_value_t = default_url())]
    pub url: String,

    /// Name attached to every event sent.
    #[arg(long, env = "HEXGLOBAL_USERNAME")]
    pub username: String,

    /// Country name attached to every event sent.
    #[arg(long, default_value = UNKNOWN_COUNTRY)]
    pub country: String,

    /// Two-letter country code attached to every event sent.
    #[arg(long, default_value = UNKNOWN_COUNTRY_CODE)]
    pub country_code: String,

    /// Latitude in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub latitude: f64,

    /// Longitude in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub longitude: f64,

    /// Delay before the first reconnect attempt, in milliseconds.
    #[arg(long, env = "HEXGLOBAL_RECONNECT_DELAY_MS", default_value_t = ReconnectConfig::default().initial_delay_ms)]
    pub reconnect_delay_ms: u64,

    /// Consecutive failed connection attempts before giving up (0 = never).
    #[arg(long, env = "HEXGLOBAL_MAX_RECONNECTS", default_value_t = ReconnectConfig::default().max_attempts)]
    pub max_attempts: u32,

    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn default_url() -> String {
    format!("ws://localhost:{DEFAULT_PORT}{WS_PATH}")
}

/// Runtime configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the hub.
    pub url: String,
    /// Reconnection backoff settings.
    pub reconnect: ReconnectConfig,
}

/// Reconnect backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnect attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnect attempts, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// Consecutive failures tolerated before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3000,
            max_delay_ms: 30000,
            backoff_factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl From<&Cli> for ClientConfig {
    fn from(cli: &Cli) -> Self {
        let defaults = ReconnectConfig::default();
        Self {
            url: cli.url.clone(),
            reconnect: ReconnectConfig {
                initial_delay_ms: cli.reconnect_delay_ms,
                max_delay_ms: defaults.max_delay_ms.max(cli.reconnect_delay_ms),
                max_attempts: cli.max_attempts,
                ..defaults
            },
        }
    }
}

impl ClientConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(format!(
                "hub URL must start with ws:// or wss://, got: {}",
                self.url
            ));
        }
        if self.reconnect.initial_delay_ms == 0 {
            return Err("reconnect delay must be greater than 0".to_string());
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err("maximum reconnect delay must be >= the initial delay".to_string());
        }
        if !self.reconnect.backoff_factor.is_finite() || self.reconnect.backoff_factor < 1.0 {
            return Err("backoff factor must be a finite number >= 1".to_string());
        }
        Ok(())
    }
}
