use serde::Serialize;
use uuid::Uuid;

use crate::models::booking::BookingStatus;
use crate::models::group::{GroupStatus, LiveLocation};

/// Real-time notifications pushed to websocket subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GroupFormed {
        group_id: Uuid,
        bookings: Vec<Uuid>,
    },
    GroupAccepted {
        group_id: Uuid,
        driver_id: Uuid,
    },
    DriverArrived {
        group_id: Uuid,
    },
    LocationUpdated {
        group_id: Uuid,
        location: LiveLocation,
    },
    GroupStatusChanged {
        group_id: Uuid,
        status: GroupStatus,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        status: BookingStatus,
    },
}
