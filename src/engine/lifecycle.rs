//! Group state machine: `open -> driver_accepted -> in_progress -> completed`,
//! with `cancelled` reachable from every non-terminal state. Member bookings
//! follow the group.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{BookingStatus, CarpoolGroup, Event, GeoPoint, GroupRating, GroupStatus, LiveLocation};
use crate::state::AppState;

/// Progress signals a driver may send for an accepted group.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripSignal {
    Arrived,
    OnTrip,
    Completed,
}

pub fn accept_group(state: &AppState, group_id: &Uuid, driver_id: Uuid) -> Result<CarpoolGroup, AppError> {
    let driver = state.store.user(&driver_id)?;
    if !driver.role.can_drive() {
        return Err(AppError::Unauthorized(format!(
            "user {driver_id} is not registered as a driver"
        )));
    }

    let group = state.store.update_group(group_id, |group| {
        if group.status != GroupStatus::Open {
            return Err(AppError::Conflict(format!(
                "carpool group {} is {}, not open",
                group.id, group.status
            )));
        }
        group.status = GroupStatus::DriverAccepted;
        group.driver = Some(driver_id);
        Ok(())
    })?;

    info!(group_id = %group.id, driver_id = %driver_id, "carpool group accepted");

    state.notify(Event::GroupAccepted {
        group_id: group.id,
        driver_id,
    });
    cascade(state, &group, BookingStatus::Accepted);
    state.refresh_gauges();

    Ok(group)
}

pub fn update_location(
    state: &AppState,
    group_id: &Uuid,
    actor: Uuid,
    point: GeoPoint,
) -> Result<CarpoolGroup, AppError> {
    if !point.is_valid() {
        return Err(AppError::Validation("lat/lng out of range".to_string()));
    }

    let group = state.store.update_group(group_id, |group| {
        ensure_driver(group, actor)?;
        if group.status != GroupStatus::InProgress {
            return Err(AppError::Conflict(format!(
                "location updates are only accepted in progress, group is {}",
                group.status
            )));
        }
        group.live_location = Some(LiveLocation {
            lat: point.lat,
            lng: point.lng,
            updated_at: Utc::now(),
        });
        Ok(())
    })?;

    if let Some(location) = group.live_location.clone() {
        state.notify(Event::LocationUpdated {
            group_id: group.id,
            location,
        });
    }

    Ok(group)
}

pub fn update_status(
    state: &AppState,
    group_id: &Uuid,
    actor: Uuid,
    signal: TripSignal,
) -> Result<CarpoolGroup, AppError> {
    let group = state.store.update_group(group_id, |group| {
        ensure_driver(group, actor)?;
        group.status = next_status(group.status, signal)?;
        Ok(())
    })?;

    info!(group_id = %group.id, signal = ?signal, status = %group.status, "carpool group status updated");

    match signal {
        TripSignal::Arrived => state.notify(Event::DriverArrived { group_id: group.id }),
        TripSignal::OnTrip | TripSignal::Completed => {
            state.notify(Event::GroupStatusChanged {
                group_id: group.id,
                status: group.status,
            });
            let booking_status = match signal {
                TripSignal::OnTrip => BookingStatus::OnTrip,
                _ => BookingStatus::Completed,
            };
            cascade(state, &group, booking_status);
        }
    }

    Ok(group)
}

/// Transition table for driver signals. `arrived` leaves the status untouched.
pub fn next_status(current: GroupStatus, signal: TripSignal) -> Result<GroupStatus, AppError> {
    match (current, signal) {
        (GroupStatus::DriverAccepted, TripSignal::Arrived) => Ok(GroupStatus::DriverAccepted),
        (GroupStatus::DriverAccepted, TripSignal::OnTrip) => Ok(GroupStatus::InProgress),
        (GroupStatus::DriverAccepted | GroupStatus::InProgress, TripSignal::Completed) => {
            Ok(GroupStatus::Completed)
        }
        (current, signal) => Err(AppError::Conflict(format!(
            "cannot apply {signal:?} to a group that is {current}"
        ))),
    }
}

/// Cancels a group. Before acceptance any member passenger may cancel; after
/// it only the assigned driver.
pub fn cancel_group(state: &AppState, group_id: &Uuid, actor: Uuid) -> Result<CarpoolGroup, AppError> {
    let snapshot = state.store.group(group_id)?;
    let is_member = is_member_passenger(state, &snapshot, actor);

    let group = state.store.update_group(group_id, |group| {
        if group.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "carpool group {} is already {}",
                group.id, group.status
            )));
        }
        match group.status {
            GroupStatus::Open if is_member => {}
            GroupStatus::Open => {
                return Err(AppError::Unauthorized(format!(
                    "user {actor} is not a passenger of group {}",
                    group.id
                )));
            }
            _ => ensure_driver(group, actor)?,
        }
        group.status = GroupStatus::Cancelled;
        Ok(())
    })?;

    info!(group_id = %group.id, actor = %actor, "carpool group cancelled");

    state.notify(Event::GroupStatusChanged {
        group_id: group.id,
        status: group.status,
    });
    cascade(state, &group, BookingStatus::Cancelled);
    state.refresh_gauges();

    Ok(group)
}

/// Records a passenger's 1-5 score for a completed trip and folds it into the
/// driver's running average.
pub fn rate_group(state: &AppState, group_id: &Uuid, actor: Uuid, score: i64) -> Result<CarpoolGroup, AppError> {
    let score = u8::try_from(score)
        .ok()
        .filter(|s| (1..=5).contains(s))
        .ok_or_else(|| AppError::Validation(format!("rating must be an integer from 1 to 5, got {score}")))?;

    let snapshot = state.store.group(group_id)?;
    if !is_member_passenger(state, &snapshot, actor) {
        return Err(AppError::Unauthorized(format!(
            "user {actor} is not a passenger of group {group_id}"
        )));
    }

    let group = state.store.update_group(group_id, |group| {
        if group.status != GroupStatus::Completed {
            return Err(AppError::Conflict(format!(
                "carpool group {} is {}; only completed trips can be rated",
                group.id, group.status
            )));
        }
        if group.has_rated(&actor) {
            return Err(AppError::Conflict(format!(
                "user {actor} already rated group {}",
                group.id
            )));
        }
        group.ratings.push(GroupRating {
            passenger_id: actor,
            score,
        });
        Ok(())
    })?;

    if let Some(driver_id) = group.driver {
        let driver = state.store.update_user(&driver_id, |driver| driver.record_rating(score))?;
        info!(
            group_id = %group.id,
            driver_id = %driver_id,
            rating = driver.rating,
            rating_count = driver.rating_count,
            "driver rated"
        );
    }

    Ok(group)
}

fn ensure_driver(group: &CarpoolGroup, actor: Uuid) -> Result<(), AppError> {
    if group.driver == Some(actor) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "only the assigned driver may manage group {}",
            group.id
        )))
    }
}

fn is_member_passenger(state: &AppState, group: &CarpoolGroup, actor: Uuid) -> bool {
    group
        .bookings
        .iter()
        .filter_map(|id| state.store.booking(id).ok())
        .any(|booking| booking.user_id == actor)
}

fn cascade(state: &AppState, group: &CarpoolGroup, status: BookingStatus) {
    for booking_id in state.store.cascade_status(&group.bookings, status) {
        state.notify(Event::BookingStatusChanged { booking_id, status });
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{
        accept_group, cancel_group, next_status, rate_group, update_location, update_status,
        TripSignal,
    };
    use crate::config::MatchingConfig;
    use crate::engine::grouping::attempt_group;
    use crate::error::AppError;
    use crate::models::{
        Booking, BookingStatus, CarpoolGroup, GeoPoint, GroupStatus, Place, Role, ServiceKind, User,
    };
    use crate::state::AppState;

    struct Fixture {
        state: AppState,
        group: CarpoolGroup,
        passengers: Vec<Uuid>,
        driver: Uuid,
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "user".to_string(),
            email: "user@campus.edu".to_string(),
            role,
            rating: 5.0,
            rating_count: 0,
            created_at: Utc::now(),
        }
    }

    fn fixture() -> Fixture {
        let state = AppState::new(MatchingConfig::default(), 16);
        let point = GeoPoint { lat: 23.73, lng: 90.39 };
        let dest = GeoPoint { lat: 23.79, lng: 90.40 };

        let mut passengers = Vec::new();
        let mut bookings = Vec::new();
        for _ in 0..2 {
            let passenger = user(Role::Passenger);
            passengers.push(passenger.id);
            let booking = Booking {
                id: Uuid::new_v4(),
                user_id: passenger.id,
                service: ServiceKind::Ride,
                pickup: Place { name: "campus".to_string(), point },
                destination: Some(Place { name: "gulshan".to_string(), point: dest }),
                carpool: true,
                item: None,
                estimated_fare: 120.0,
                passenger_fare: None,
                carpool_group: None,
                status: BookingStatus::Requested,
                created_at: Utc::now(),
                reserved_by: None,
            };
            state.store.insert_user(passenger);
            state.store.insert_booking(booking.clone());
            bookings.push(booking);
        }

        let driver = user(Role::Driver);
        let driver_id = driver.id;
        state.store.insert_user(driver);

        let group = attempt_group(&state, &bookings[1]).unwrap().unwrap();

        Fixture {
            state,
            group,
            passengers,
            driver: driver_id,
        }
    }

    fn member_statuses(fx: &Fixture) -> Vec<BookingStatus> {
        fx.group
            .bookings
            .iter()
            .map(|id| fx.state.store.booking(id).unwrap().status)
            .collect()
    }

    #[test]
    fn transition_table() {
        use GroupStatus::*;
        use TripSignal::*;

        assert_eq!(next_status(DriverAccepted, Arrived).unwrap(), DriverAccepted);
        assert_eq!(next_status(DriverAccepted, OnTrip).unwrap(), InProgress);
        assert_eq!(next_status(InProgress, TripSignal::Completed).unwrap(), GroupStatus::Completed);
        assert_eq!(next_status(DriverAccepted, TripSignal::Completed).unwrap(), GroupStatus::Completed);

        assert!(next_status(Open, OnTrip).is_err());
        assert!(next_status(InProgress, OnTrip).is_err());
        assert!(next_status(InProgress, Arrived).is_err());
        assert!(next_status(GroupStatus::Completed, TripSignal::Completed).is_err());
        assert!(next_status(Cancelled, Arrived).is_err());
    }

    #[test]
    fn full_trip_cascades_to_members() {
        let fx = fixture();
        let id = fx.group.id;

        let accepted = accept_group(&fx.state, &id, fx.driver).unwrap();
        assert_eq!(accepted.status, GroupStatus::DriverAccepted);
        assert_eq!(accepted.driver, Some(fx.driver));
        assert!(member_statuses(&fx).iter().all(|s| *s == BookingStatus::Accepted));

        let arrived = update_status(&fx.state, &id, fx.driver, TripSignal::Arrived).unwrap();
        assert_eq!(arrived.status, GroupStatus::DriverAccepted);
        assert!(member_statuses(&fx).iter().all(|s| *s == BookingStatus::Accepted));

        update_status(&fx.state, &id, fx.driver, TripSignal::OnTrip).unwrap();
        assert!(member_statuses(&fx).iter().all(|s| *s == BookingStatus::OnTrip));

        let moved = update_location(&fx.state, &id, fx.driver, GeoPoint { lat: 23.75, lng: 90.395 }).unwrap();
        assert_eq!(moved.live_location.unwrap().lat, 23.75);

        let done = update_status(&fx.state, &id, fx.driver, TripSignal::Completed).unwrap();
        assert_eq!(done.status, GroupStatus::Completed);
        assert!(member_statuses(&fx).iter().all(|s| *s == BookingStatus::Completed));
    }

    #[test]
    fn group_can_only_be_accepted_once() {
        let fx = fixture();
        accept_group(&fx.state, &fx.group.id, fx.driver).unwrap();

        let other = user(Role::Both);
        let other_id = other.id;
        fx.state.store.insert_user(other);

        let err = accept_group(&fx.state, &fx.group.id, other_id).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn passengers_cannot_accept_groups() {
        let fx = fixture();
        let err = accept_group(&fx.state, &fx.group.id, fx.passengers[0]).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn only_assigned_driver_manages_the_trip() {
        let fx = fixture();
        accept_group(&fx.state, &fx.group.id, fx.driver).unwrap();

        let err = update_status(&fx.state, &fx.group.id, fx.passengers[0], TripSignal::OnTrip).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = update_location(&fx.state, &fx.group.id, Uuid::new_v4(), GeoPoint { lat: 1.0, lng: 1.0 })
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn location_requires_trip_in_progress() {
        let fx = fixture();
        accept_group(&fx.state, &fx.group.id, fx.driver).unwrap();

        let err = update_location(&fx.state, &fx.group.id, fx.driver, GeoPoint { lat: 1.0, lng: 1.0 })
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn rating_requires_completion_and_happens_once() {
        let fx = fixture();
        let id = fx.group.id;
        accept_group(&fx.state, &id, fx.driver).unwrap();

        let err = rate_group(&fx.state, &id, fx.passengers[0], 4).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        update_status(&fx.state, &id, fx.driver, TripSignal::OnTrip).unwrap();
        update_status(&fx.state, &id, fx.driver, TripSignal::Completed).unwrap();

        rate_group(&fx.state, &id, fx.passengers[0], 4).unwrap();
        let err = rate_group(&fx.state, &id, fx.passengers[0], 5).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        rate_group(&fx.state, &id, fx.passengers[1], 3).unwrap();

        let driver = fx.state.store.user(&fx.driver).unwrap();
        assert_eq!(driver.rating_count, 2);
        assert_eq!(driver.rating, 3.5);

        let group = fx.state.store.group(&id).unwrap();
        assert_eq!(group.ratings.len(), 2);
    }

    #[test]
    fn rating_is_validated_and_restricted_to_members() {
        let fx = fixture();
        let id = fx.group.id;

        for bad in [0, 6, -1] {
            let err = rate_group(&fx.state, &id, fx.passengers[0], bad).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }

        let err = rate_group(&fx.state, &id, Uuid::new_v4(), 5).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn open_group_cancelled_by_member() {
        let fx = fixture();
        let outsider = Uuid::new_v4();
        let err = cancel_group(&fx.state, &fx.group.id, outsider).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let cancelled = cancel_group(&fx.state, &fx.group.id, fx.passengers[1]).unwrap();
        assert_eq!(cancelled.status, GroupStatus::Cancelled);
        assert!(member_statuses(&fx).iter().all(|s| *s == BookingStatus::Cancelled));

        let err = cancel_group(&fx.state, &fx.group.id, fx.passengers[1]).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn accepted_group_cancelled_only_by_driver() {
        let fx = fixture();
        accept_group(&fx.state, &fx.group.id, fx.driver).unwrap();

        let err = cancel_group(&fx.state, &fx.group.id, fx.passengers[0]).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let cancelled = cancel_group(&fx.state, &fx.group.id, fx.driver).unwrap();
        assert_eq!(cancelled.status, GroupStatus::Cancelled);
    }

    #[test]
    fn unknown_group_is_not_found() {
        let fx = fixture();
        let err = accept_group(&fx.state, &Uuid::new_v4(), fx.driver).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
