use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Ride,
    Item,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemSize {
    Small,
    Medium,
    Large,
}

impl ItemSize {
    pub fn multiplier(self) -> f64 {
        match self {
            ItemSize::Small => 1.0,
            ItemSize::Medium => 1.5,
            ItemSize::Large => 2.0,
        }
    }
}

impl FromStr for ItemSize {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ItemSize::Small),
            "medium" => Ok(ItemSize::Medium),
            "large" => Ok(ItemSize::Large),
            _ => Err(AppError::InvalidItemSize(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Requested,
    Accepted,
    OnTrip,
    Completed,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Accepted => "accepted",
            BookingStatus::OnTrip => "on_trip",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(flatten)]
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetails {
    pub description: String,
    pub size: ItemSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service: ServiceKind,
    pub pickup: Place,
    pub destination: Option<Place>,
    pub carpool: bool,
    pub item: Option<ItemDetails>,
    /// Fixed at creation.
    pub estimated_fare: f64,
    /// Set once the booking joins a carpool group.
    pub passenger_fare: Option<f64>,
    pub carpool_group: Option<Uuid>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    /// Grouping attempt currently holding this booking, if any.
    #[serde(skip)]
    pub reserved_by: Option<Uuid>,
}

impl Booking {
    pub fn destination_point(&self) -> Option<&GeoPoint> {
        self.destination.as_ref().map(|place| &place.point)
    }

    /// Still waiting in the pool: requested, ungrouped and not held by an attempt.
    pub fn is_poolable(&self) -> bool {
        self.carpool
            && self.status == BookingStatus::Requested
            && self.carpool_group.is_none()
            && self.reserved_by.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{BookingStatus, ItemSize};
    use crate::error::AppError;

    #[test]
    fn item_size_parses_case_insensitively() {
        assert_eq!("Large".parse::<ItemSize>().unwrap(), ItemSize::Large);
        assert_eq!(" small ".parse::<ItemSize>().unwrap(), ItemSize::Small);
    }

    #[test]
    fn unknown_item_size_is_rejected() {
        let err = "huge".parse::<ItemSize>().unwrap_err();
        assert!(matches!(err, AppError::InvalidItemSize(ref size) if size == "huge"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&BookingStatus::OnTrip).unwrap();
        assert_eq!(json, "\"on_trip\"");
        assert_eq!(BookingStatus::OnTrip.to_string(), "on_trip");
    }
}
