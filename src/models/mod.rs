pub mod booking;
pub mod event;
pub mod group;
pub mod matching;
pub mod user;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// True when both coordinates are finite decimal degrees in range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

pub use booking::{Booking, BookingStatus, ItemDetails, ItemSize, Place, ServiceKind};
pub use event::Event;
pub use group::{CarpoolGroup, GroupRating, GroupStatus, LiveLocation};
pub use matching::{ScoreBreakdown, ScoredMatch};
pub use user::{Role, User};
