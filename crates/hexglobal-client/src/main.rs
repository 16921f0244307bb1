#![forbid(unsafe_code)]

use hexglobal_client::config::{ClientConfig, Cli};
use hexglobal_client::connection::{connection_manager, ConnStatus};
use hexglobal_client::feed::{format_event, forward_lines, Profile};

use clap::Parser;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(cli: &Cli) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };

    // stdout carries the event feed, logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider, wss:// may be unavailable");
    }

    let cli = Cli::parse();
    init_tracing(&cli);

    let config = ClientConfig::from(&cli);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    let profile = Profile::from(&cli);

    let (outbox_tx, outbox_rx) = mpsc::channel::<hexglobal_common::Event>(64);
    let (inbox_tx, mut inbox_rx) = broadcast::channel(256);
    let (status_tx, mut status_rx) = watch::channel(ConnStatus::Disconnected);

    info!(url = %config.url, username = %profile.username, "starting client");
    let mut manager = tokio::spawn(connection_manager(
        Arc::new(config),
        outbox_rx,
        inbox_tx,
        status_tx,
    ));

    // Own task, so waiting for room in the outbox never holds up the display.
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = forward_lines(stdin, &profile, outbox_tx).await {
            warn!(error = %e, "failed to read stdin");
        }
    });

    loop {
        tokio::select! {
            received = inbox_rx.recv() => {
                match received {
                    Ok(event) => println!("{}", format_event(&event)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "display fell behind, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return manager.await?,
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    return manager.await?;
                }
                info!(status = ?*status_rx.borrow(), "connection status");
            }
            result = &mut manager => {
                return result?;
            }
        }
    }
}
