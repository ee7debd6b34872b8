//! Fare policy. The constants are fixed business rules, not tunables.

use serde::Serialize;

use crate::models::{ItemSize, ServiceKind};

pub const RIDE_BASE: f64 = 100.0;
pub const RIDE_PER_KM: f64 = 10.0;
pub const CARPOOL_DISCOUNT: f64 = 0.3;

pub const ITEM_BASE: f64 = 50.0;
pub const ITEM_PER_KM: f64 = 5.0;

pub const CURRENCY: &str = "TAKA";

/// Extra discount per group member beyond the first, and its ceiling.
pub const GROUP_DISCOUNT_PER_EXTRA_MEMBER: f64 = 0.2;
pub const GROUP_DISCOUNT_CAP: f64 = 0.5;

/// Rounds half away from zero to the cent.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn estimate_ride_fare(distance_km: f64, carpool: bool) -> f64 {
    let mut fare = RIDE_BASE + RIDE_PER_KM * distance_km;
    if carpool {
        fare *= 1.0 - CARPOOL_DISCOUNT;
    }
    round2(fare)
}

pub fn estimate_item_fare(distance_km: f64, size: ItemSize) -> f64 {
    round2(ITEM_BASE + ITEM_PER_KM * distance_km * size.multiplier())
}

pub fn group_discount(member_count: usize) -> f64 {
    let extra = member_count.saturating_sub(1) as f64;
    (GROUP_DISCOUNT_PER_EXTRA_MEMBER * extra).min(GROUP_DISCOUNT_CAP)
}

/// Breakdown returned alongside an estimate.
#[derive(Debug, Clone, Serialize)]
pub struct FareQuote {
    pub distance_km: f64,
    pub estimated_fare: f64,
    pub currency: &'static str,
    pub breakdown: FareBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct FareBreakdown {
    pub service: ServiceKind,
    pub base: f64,
    pub per_km: f64,
    pub carpool: bool,
    pub item_size: Option<ItemSize>,
}

pub fn quote(service: ServiceKind, distance_km: f64, carpool: bool, item_size: ItemSize) -> FareQuote {
    let (estimated_fare, base, per_km, item_size) = match service {
        ServiceKind::Ride => (estimate_ride_fare(distance_km, carpool), RIDE_BASE, RIDE_PER_KM, None),
        ServiceKind::Item => (
            estimate_item_fare(distance_km, item_size),
            ITEM_BASE,
            ITEM_PER_KM,
            Some(item_size),
        ),
    };

    FareQuote {
        distance_km: round2(distance_km),
        estimated_fare,
        currency: CURRENCY,
        breakdown: FareBreakdown {
            service,
            base,
            per_km,
            carpool,
            item_size,
        },
    }
}
