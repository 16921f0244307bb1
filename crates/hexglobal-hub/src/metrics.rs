use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness state.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a health state that starts out ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready or draining.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Routes for `/health` and `/ready`.
pub fn health_router(health_state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())))
}

/// # Errors
///
/// Returns an error if the recorder is already installed or binding fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = health_router(health_state).route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// 200 while accepting clients, 503 once shutdown has begun.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "draining",
                ready: false,
            }),
        )
    }
}

/// Connection gauges.
pub mod gauges {
    /// Set the connected-clients gauge to the registry size.
    #[allow(clippy::cast_precision_loss)]
    pub fn clients_connected(count: usize) {
        metrics::gauge!("hexglobal_clients_connected").set(count as f64);
    }
}

/// Event counters.
pub mod counters {
    /// Increment the inbound events counter.
    pub fn events_received_total() {
        metrics::counter!("hexglobal_events_received_total").increment(1);
    }

    /// Increment the broadcast events counter.
    pub fn events_broadcast_total() {
        metrics::counter!("hexglobal_events_broadcast_total").increment(1);
    }

    /// Count frames successfully queued to clients.
    pub fn deliveries_total(count: u64) {
        metrics::counter!("hexglobal_deliveries_total").increment(count);
    }

    /// Record a client removed by the broadcaster.
    pub fn evictions_total(reason: &'static str) {
        metrics::counter!("hexglobal_evictions_total", "reason" => reason).increment(1);
    }

    /// Record an event dropped before or during broadcast.
    pub fn events_dropped_total(reason: &'static str) {
        metrics::counter!("hexglobal_events_dropped_total", "reason" => reason).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record how long one fan-out took, in seconds.
    pub fn broadcast_latency_seconds(value: f64) {
        metrics::histogram!("hexglobal_broadcast_latency_seconds").record(value);
    }
}
