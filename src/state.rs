use tokio::sync::broadcast;
use tracing::debug;

use crate::config::MatchingConfig;
use crate::models::Event;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub matching: MatchingConfig,
    pub events_tx: broadcast::Sender<Event>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(matching: MatchingConfig, event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store: Store::new(),
            matching,
            events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Best-effort fan-out to websocket subscribers. Never fails the caller.
    pub fn notify(&self, event: Event) {
        if let Err(err) = self.events_tx.send(event) {
            debug!(event = ?err.0, "no subscribers; notification dropped");
        }
    }

    pub fn refresh_gauges(&self) {
        self.metrics
            .open_groups
            .set(self.store.count_open_groups() as i64);
        self.metrics
            .pending_carpool_bookings
            .set(self.store.count_pending() as i64);
    }
}
