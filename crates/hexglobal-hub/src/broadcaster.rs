//! Single consumer of the event queue.
//!
//! Every event is encoded once and a text frame carrying it is queued to every
//! client registered at that moment. Because there is exactly one broadcaster, all clients that stay
//! connected observe events in the same order.

use crate::metrics::{counters, gauges, histograms};
use crate::registry::Registry;
use hexglobal_common::Event;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outcome of fanning out one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients the frame was queued to.
    pub delivered: usize,
    /// Clients removed because delivery failed.
    pub evicted: usize,
}

/// Drains the event queue and fans each event out to the registry.
#[derive(Debug)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl Broadcaster {
    /// Create a broadcaster over the receiving half of the event queue.
    #[must_use]
    pub fn new(registry: Arc<Registry>, events: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { registry, events }
    }

    /// Broadcast events until every producer has hung up.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            let start = Instant::now();
            let report = self.broadcast(&event);
            histograms::broadcast_latency_seconds(start.elapsed().as_secs_f64());
            debug!(
                delivered = report.delivered,
                evicted = report.evicted,
                "event broadcast"
            );
        }
        debug!("event queue closed, broadcaster stopping");
    }

    /// Queue one event to every registered client.
    ///
    /// A client whose queue is closed or full is unregistered, which drops its
    /// handle and closes the connection. Other clients are unaffected and the
    /// failed delivery is not retried. An event that cannot be encoded reaches
    /// nobody.
    pub fn broadcast(&self, event: &Event) -> BroadcastReport {
        let frame = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, username = %event.username, "dropping unencodable event");
                counters::events_dropped_total("encode");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for client in self.registry.snapshot() {
            match client.deliver(&frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(client = client.id, peer = %client.peer_addr, error = %e, "delivery failed, removing client");
                    if self.registry.unregister(client.id).is_some() {
                        counters::evictions_total(e.reason());
                        report.evicted += 1;
                    }
                }
            }
        }

        counters::events_broadcast_total();
        counters::deliveries_total(report.delivered as u64);
        if report.evicted > 0 {
            gauges::clients_connected(self.registry.len());
        }
        report
    }
}
