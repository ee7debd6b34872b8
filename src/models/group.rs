use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Open,
    DriverAccepted,
    InProgress,
    Completed,
    Cancelled,
}

impl GroupStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GroupStatus::Completed | GroupStatus::Cancelled)
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GroupStatus::Open => "open",
            GroupStatus::DriverAccepted => "driver_accepted",
            GroupStatus::InProgress => "in_progress",
            GroupStatus::Completed => "completed",
            GroupStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveLocation {
    pub lat: f64,
    pub lng: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRating {
    pub passenger_id: Uuid,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarpoolGroup {
    pub id: Uuid,
    /// Join order; the triggering booking comes first.
    pub bookings: Vec<Uuid>,
    pub pickup_centroid: Option<GeoPoint>,
    pub destination_centroid: Option<GeoPoint>,
    pub total_fare: f64,
    pub split_fares: HashMap<Uuid, f64>,
    pub status: GroupStatus,
    pub driver: Option<Uuid>,
    pub live_location: Option<LiveLocation>,
    pub ratings: Vec<GroupRating>,
    pub created_at: DateTime<Utc>,
}

impl CarpoolGroup {
    pub fn has_member(&self, booking_id: &Uuid) -> bool {
        self.bookings.contains(booking_id)
    }

    pub fn has_rated(&self, passenger_id: &Uuid) -> bool {
        self.ratings.iter().any(|r| &r.passenger_id == passenger_id)
    }
}
