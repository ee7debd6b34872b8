use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::grouping::attempt_group;
use crate::error::AppError;
use crate::models::{BookingStatus, Event};
use crate::state::AppState;

/// Periodically retries grouping for carpool bookings still waiting for
/// partners and expires the ones that waited longer than the configured TTL.
pub async fn run_pending_sweeper(state: Arc<AppState>) {
    let mut ticker = interval(state.matching.retry_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = state.matching.retry_interval.as_secs(),
        ttl_secs = state.matching.pending_ttl.map(|ttl| ttl.as_secs()),
        "pending carpool sweeper started"
    );

    loop {
        ticker.tick().await;
        let report = sweep_pending(&state);
        if report.grouped > 0 || report.expired > 0 {
            info!(grouped = report.grouped, expired = report.expired, "pending carpool sweep finished");
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub grouped: usize,
    pub expired: usize,
    pub failed: usize,
}

/// One pass over the pending pool, oldest booking first.
pub fn sweep_pending(state: &AppState) -> SweepReport {
    let mut report = SweepReport::default();
    let now = Utc::now();
    let ttl = state
        .matching
        .pending_ttl
        .and_then(|ttl| chrono::Duration::from_std(ttl).ok());

    for booking in state.store.pending_carpool_bookings() {
        if ttl.is_some_and(|ttl| now - booking.created_at > ttl) {
            match expire_booking(state, &booking.id) {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(booking_id = %booking.id, error = %err, "failed to expire carpool booking");
                }
            }
            continue;
        }

        // Bookings swept into a group earlier in this pass are skipped by the reservation.
        match attempt_group(state, &booking) {
            Ok(Some(_)) => report.grouped += 1,
            Ok(None) => {}
            Err(_) => report.failed += 1,
        }
    }

    state.refresh_gauges();
    report
}

fn expire_booking(state: &AppState, booking_id: &uuid::Uuid) -> Result<bool, AppError> {
    let mut expired = false;
    state.store.update_booking(booking_id, |booking| {
        if booking.is_poolable() {
            booking.status = BookingStatus::Cancelled;
            expired = true;
        }
        Ok(())
    })?;

    if expired {
        debug!(booking_id = %booking_id, "carpool booking expired without a group");
        state.metrics.bookings_expired_total.inc();
        state.notify(Event::BookingStatusChanged {
            booking_id: *booking_id,
            status: BookingStatus::Cancelled,
        });
    }

    Ok(expired)
}
