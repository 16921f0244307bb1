#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use hexglobal_hub::config::{Args, ServerConfig};
use hexglobal_hub::metrics::{start_metrics_server, HealthState};
use hexglobal_hub::{run_with_shutdown, ServerState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config: ServerConfig = args.into();

    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let health_state = HealthState::new();
    if let Some(metrics_addr) = config.metrics_addr {
        tokio::spawn({
            let health_state = health_state.clone();
            async move {
                if let Err(e) = start_metrics_server(metrics_addr, health_state).await {
                    warn!("metrics server error: {}", e);
                }
            }
        });
    }

    let (state, broadcaster) = ServerState::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received shutdown signal"),
            Err(e) => {
                warn!("cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
        health_state.set_ready(false);
        drop(shutdown_tx);
    });

    if let Err(e) = run_with_shutdown(listener, state, broadcaster, shutdown_rx).await {
        tracing::error!("server error: {}", e);
    }

    Ok(())
}
