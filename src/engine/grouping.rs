use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::engine::fare::{group_discount, round2};
use crate::error::AppError;
use crate::geo::{centroid, haversine_km};
use crate::models::{Booking, CarpoolGroup, Event, GroupStatus};
use crate::state::AppState;

/// Total fare of a group and each member's share of it.
#[derive(Debug, Clone, PartialEq)]
pub struct FareSplit {
    pub total_fare: f64,
    pub shares: HashMap<Uuid, f64>,
}

/// Tries to place a freshly submitted carpool booking into a new group with
/// compatible waiting bookings. Returns `None` when nothing fits.
///
/// Every member is reserved before the group is written, so a booking can
/// never end up in two groups even when attempts race.
pub fn attempt_group(state: &AppState, booking: &Booking) -> Result<Option<CarpoolGroup>, AppError> {
    let start = Instant::now();
    let result = form_group(state, booking);
    let elapsed = start.elapsed().as_secs_f64();

    match &result {
        Ok(Some(_)) => state.metrics.observe_attempt("grouped", elapsed),
        Ok(None) => state.metrics.observe_attempt("no_match", elapsed),
        Err(err) => {
            state.metrics.observe_attempt("error", elapsed);
            error!(booking_id = %booking.id, error = %err, "carpool grouping failed");
        }
    }
    state.refresh_gauges();

    result
}

fn form_group(state: &AppState, booking: &Booking) -> Result<Option<CarpoolGroup>, AppError> {
    if !booking.carpool {
        return Ok(None);
    }
    if booking.destination.is_none() {
        debug!(booking_id = %booking.id, "carpool booking has no destination; not grouping");
        return Ok(None);
    }

    let config = &state.matching;
    let attempt_id = Uuid::new_v4();

    if !state.store.try_reserve(&booking.id, attempt_id) {
        debug!(booking_id = %booking.id, "booking already grouped or held by another attempt");
        return Ok(None);
    }

    let mut members = vec![booking.clone()];
    for candidate in state.store.carpool_candidates(&booking.id, config.scan_limit) {
        if members.len() >= config.max_group_size {
            break;
        }
        if !is_compatible(booking, &candidate, config) {
            continue;
        }
        // Lost the race for this candidate; keep scanning.
        if state.store.try_reserve(&candidate.id, attempt_id) {
            members.push(candidate);
        }
    }

    if members.len() < 2 {
        state.store.release(&booking.id, attempt_id);
        debug!(booking_id = %booking.id, "no compatible carpool partners yet");
        return Ok(None);
    }

    let group = build_group(&members);
    let group = match state.store.commit_group(group, attempt_id) {
        Ok(group) => group,
        Err(err) => {
            warn!(booking_id = %booking.id, error = %err, "carpool group rolled back");
            return Err(err);
        }
    };

    info!(
        group_id = %group.id,
        members = group.bookings.len(),
        total_fare = group.total_fare,
        "carpool group formed"
    );

    state.notify(Event::GroupFormed {
        group_id: group.id,
        bookings: group.bookings.clone(),
    });

    Ok(Some(group))
}

/// Pickups within the pickup radius and destinations within the destination radius.
pub fn is_compatible(a: &Booking, b: &Booking, config: &MatchingConfig) -> bool {
    let (Some(dest_a), Some(dest_b)) = (a.destination_point(), b.destination_point()) else {
        return false;
    };

    haversine_km(&a.pickup.point, &b.pickup.point) <= config.pickup_radius_km
        && haversine_km(dest_a, dest_b) <= config.dest_radius_km
}

/// Applies the group discount to the summed estimates and splits the total in
/// proportion to each member's own estimate.
pub fn split_fares(members: &[Booking]) -> FareSplit {
    let sum_estimated: f64 = members.iter().map(|b| b.estimated_fare).sum();
    let total_fare = round2(sum_estimated * (1.0 - group_discount(members.len())));

    let shares = members
        .iter()
        .map(|b| {
            let share = if sum_estimated > 0.0 {
                b.estimated_fare / sum_estimated * total_fare
            } else {
                total_fare / members.len() as f64
            };
            (b.id, round2(share))
        })
        .collect();

    FareSplit { total_fare, shares }
}

fn build_group(members: &[Booking]) -> CarpoolGroup {
    let FareSplit { total_fare, shares } = split_fares(members);

    CarpoolGroup {
        id: Uuid::new_v4(),
        bookings: members.iter().map(|b| b.id).collect(),
        pickup_centroid: centroid(members.iter().map(|b| &b.pickup.point)),
        destination_centroid: centroid(members.iter().filter_map(Booking::destination_point)),
        total_fare,
        split_fares: shares,
        status: GroupStatus::Open,
        driver: None,
        live_location: None,
        ratings: Vec::new(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{attempt_group, is_compatible, split_fares};
    use crate::config::MatchingConfig;
    use crate::models::{Booking, BookingStatus, GeoPoint, Place, ServiceKind};
    use crate::state::AppState;

    // Dhaka University area; 0.01 deg of latitude is ~1.1 km.
    const CAMPUS: GeoPoint = GeoPoint { lat: 23.7340, lng: 90.3929 };
    const GULSHAN: GeoPoint = GeoPoint { lat: 23.7925, lng: 90.4078 };

    fn shifted(p: GeoPoint, dlat: f64) -> GeoPoint {
        GeoPoint { lat: p.lat + dlat, lng: p.lng }
    }

    fn carpool(pickup: GeoPoint, destination: GeoPoint, fare: f64, minutes_ago: i64) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            service: ServiceKind::Ride,
            pickup: Place { name: "pickup".to_string(), point: pickup },
            destination: Some(Place { name: "destination".to_string(), point: destination }),
            carpool: true,
            item: None,
            estimated_fare: fare,
            passenger_fare: None,
            carpool_group: None,
            status: BookingStatus::Requested,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            reserved_by: None,
        }
    }

    fn state() -> AppState {
        AppState::new(MatchingConfig::default(), 16)
    }

    #[test]
    fn two_compatible_bookings_form_a_discounted_group() {
        let state = state();
        let y = carpool(shifted(CAMPUS, 0.01), shifted(GULSHAN, 0.01), 150.0, 5);
        let x = carpool(CAMPUS, GULSHAN, 150.0, 0);
        state.store.insert_booking(y.clone());
        state.store.insert_booking(x.clone());

        let group = attempt_group(&state, &x).unwrap().expect("group formed");

        assert_eq!(group.bookings, vec![x.id, y.id]);
        assert_eq!(group.total_fare, 240.0);
        assert_eq!(group.split_fares[&x.id], 120.0);
        assert_eq!(group.split_fares[&y.id], 120.0);

        let pickup = group.pickup_centroid.unwrap();
        assert!((pickup.lat - (CAMPUS.lat + 0.005)).abs() < 1e-9);

        for id in [x.id, y.id] {
            let linked = state.store.booking(&id).unwrap();
            assert_eq!(linked.carpool_group, Some(group.id));
            assert_eq!(linked.passenger_fare, Some(120.0));
            assert_eq!(linked.status, BookingStatus::Requested);
            assert!(linked.carpool);
        }
    }

    #[test]
    fn far_pickup_finds_no_group_and_leaves_booking_untouched() {
        let state = state();
        state
            .store
            .insert_booking(carpool(CAMPUS, GULSHAN, 150.0, 5));
        let z = carpool(shifted(CAMPUS, 0.2), GULSHAN, 150.0, 0);
        state.store.insert_booking(z.clone());

        assert!(attempt_group(&state, &z).unwrap().is_none());

        let after = state.store.booking(&z.id).unwrap();
        assert_eq!(after.carpool_group, None);
        assert_eq!(after.passenger_fare, None);
        assert_eq!(after.reserved_by, None);
    }

    #[test]
    fn both_radii_must_hold() {
        let config = MatchingConfig::default();
        let base = carpool(CAMPUS, GULSHAN, 100.0, 0);

        let near_pickup_far_dest = carpool(CAMPUS, shifted(GULSHAN, 0.1), 100.0, 0);
        let far_pickup_near_dest = carpool(shifted(CAMPUS, 0.05), GULSHAN, 100.0, 0);
        let both_near = carpool(shifted(CAMPUS, 0.02), shifted(GULSHAN, 0.03), 100.0, 0);

        assert!(!is_compatible(&base, &near_pickup_far_dest, &config));
        assert!(!is_compatible(&base, &far_pickup_near_dest, &config));
        assert!(is_compatible(&base, &both_near, &config));
    }

    #[test]
    fn solo_booking_is_a_no_op() {
        let state = state();
        let mut solo = carpool(CAMPUS, GULSHAN, 150.0, 0);
        solo.carpool = false;
        state.store.insert_booking(solo.clone());
        state
            .store
            .insert_booking(carpool(CAMPUS, GULSHAN, 150.0, 5));

        assert!(attempt_group(&state, &solo).unwrap().is_none());
    }

    #[test]
    fn group_is_capped_at_max_size_first_fit() {
        let state = state();
        let oldest = carpool(CAMPUS, GULSHAN, 100.0, 30);
        let older = carpool(CAMPUS, GULSHAN, 100.0, 20);
        let old = carpool(CAMPUS, GULSHAN, 100.0, 10);
        for b in [&oldest, &older, &old] {
            state.store.insert_booking(b.clone());
        }
        let newcomer = carpool(CAMPUS, GULSHAN, 100.0, 0);
        state.store.insert_booking(newcomer.clone());

        let group = attempt_group(&state, &newcomer).unwrap().unwrap();

        assert_eq!(group.bookings, vec![newcomer.id, oldest.id, older.id]);
        // 300 * (1 - 0.4)
        assert_eq!(group.total_fare, 180.0);
        assert!(state.store.booking(&old.id).unwrap().carpool_group.is_none());
    }

    #[test]
    fn grouped_bookings_are_not_claimed_again() {
        let state = state();
        let a = carpool(CAMPUS, GULSHAN, 100.0, 10);
        let b = carpool(CAMPUS, GULSHAN, 100.0, 5);
        state.store.insert_booking(a.clone());
        state.store.insert_booking(b.clone());
        assert!(attempt_group(&state, &b).unwrap().is_some());

        let c = carpool(CAMPUS, GULSHAN, 100.0, 0);
        state.store.insert_booking(c.clone());
        assert!(attempt_group(&state, &c).unwrap().is_none());

        // Re-running for an already grouped booking changes nothing.
        assert!(attempt_group(&state, &a).unwrap().is_none());
    }

    #[test]
    fn split_is_proportional_and_conserves_total() {
        let members = vec![
            carpool(CAMPUS, GULSHAN, 100.0, 0),
            carpool(CAMPUS, GULSHAN, 133.33, 0),
            carpool(CAMPUS, GULSHAN, 71.17, 0),
        ];

        let split = split_fares(&members);
        let sum: f64 = split.shares.values().sum();
        assert!((sum - split.total_fare).abs() <= 0.01 + 1e-9, "{sum} vs {}", split.total_fare);

        let cheap = split.shares[&members[2].id];
        let dear = split.shares[&members[1].id];
        assert!(dear > cheap);
    }

    #[test]
    fn zero_estimates_split_evenly() {
        let members = vec![
            carpool(CAMPUS, GULSHAN, 0.0, 0),
            carpool(CAMPUS, GULSHAN, 0.0, 0),
        ];

        let split = split_fares(&members);
        assert_eq!(split.total_fare, 0.0);
        assert!(split.shares.values().all(|share| *share == 0.0));
    }
}
