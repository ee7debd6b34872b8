use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::actor::Actor;
use crate::engine::fare::{quote, FareQuote};
use crate::engine::grouping::attempt_group;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::{
    Booking, BookingStatus, CarpoolGroup, Event, GeoPoint, ItemDetails, ItemSize, Place, ServiceKind,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fare/estimate", post(estimate_fare))
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/carpool", post(retry_grouping))
}

#[derive(Deserialize)]
pub struct EstimateFareRequest {
    pub service: ServiceKind,
    pub pickup: GeoPoint,
    pub destination: Option<GeoPoint>,
    #[serde(default)]
    pub carpool: bool,
    pub item_size: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub service: ServiceKind,
    pub pickup: Place,
    pub destination: Option<Place>,
    #[serde(default)]
    pub carpool: bool,
    pub item_description: Option<String>,
    pub item_size: Option<String>,
}

#[derive(Serialize)]
pub struct CreateBookingResponse {
    pub booking: Booking,
    pub carpool_group: Option<CarpoolGroup>,
}

#[derive(Serialize)]
pub struct GroupingResponse {
    pub carpool_group: Option<CarpoolGroup>,
}

/// Validates the trip shape and prices it.
fn price_trip(
    service: ServiceKind,
    pickup: &GeoPoint,
    destination: Option<&GeoPoint>,
    carpool: bool,
    item_size: Option<&str>,
) -> Result<(FareQuote, ItemSize), AppError> {
    if !pickup.is_valid() {
        return Err(AppError::Validation("pickup lat/lng out of range".to_string()));
    }
    if destination.is_some_and(|dest| !dest.is_valid()) {
        return Err(AppError::Validation("destination lat/lng out of range".to_string()));
    }
    if service == ServiceKind::Ride && destination.is_none() {
        return Err(AppError::Validation("a ride needs a destination".to_string()));
    }

    let size = match (service, item_size) {
        (ServiceKind::Item, Some(raw)) => raw.parse::<ItemSize>()?,
        _ => ItemSize::Small,
    };

    let distance_km = destination.map_or(0.0, |dest| haversine_km(pickup, dest));
    Ok((quote(service, distance_km, carpool, size), size))
}

async fn estimate_fare(Json(payload): Json<EstimateFareRequest>) -> Result<Json<FareQuote>, AppError> {
    let (fare, _) = price_trip(
        payload.service,
        &payload.pickup,
        payload.destination.as_ref(),
        payload.carpool,
        payload.item_size.as_deref(),
    )?;
    Ok(Json(fare))
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Actor(user_id): Actor,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    state.store.user(&user_id)?;

    let (fare, size) = price_trip(
        payload.service,
        &payload.pickup.point,
        payload.destination.as_ref().map(|place| &place.point),
        payload.carpool,
        payload.item_size.as_deref(),
    )?;

    let item = (payload.service == ServiceKind::Item).then(|| ItemDetails {
        description: payload.item_description.unwrap_or_default(),
        size,
    });

    let booking = Booking {
        id: Uuid::new_v4(),
        user_id,
        service: payload.service,
        pickup: payload.pickup,
        destination: payload.destination,
        carpool: payload.carpool,
        item,
        estimated_fare: fare.estimated_fare,
        passenger_fare: None,
        carpool_group: None,
        status: BookingStatus::Requested,
        created_at: Utc::now(),
        reserved_by: None,
    };

    state.store.insert_booking(booking.clone());
    info!(booking_id = %booking.id, carpool = booking.carpool, fare = booking.estimated_fare, "booking created");

    // The booking stands even if grouping fails; the sweeper retries it later.
    let carpool_group = if booking.carpool {
        attempt_group(&state, &booking).unwrap_or_else(|err| {
            warn!(booking_id = %booking.id, error = %err, "carpool attempt failed; booking left pending");
            None
        })
    } else {
        None
    };

    let booking = state.store.booking(&booking.id)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking,
            carpool_group,
        }),
    ))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.store.booking(&id)?))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Actor(user_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.store.update_booking(&id, |booking| {
        if booking.user_id != user_id {
            return Err(AppError::Unauthorized(format!("booking {id} belongs to another user")));
        }
        if booking.status != BookingStatus::Requested {
            return Err(AppError::Conflict(format!("booking {id} is already {}", booking.status)));
        }
        if let Some(group_id) = booking.carpool_group {
            return Err(AppError::Conflict(format!(
                "booking {id} is part of carpool group {group_id}; cancel the group instead"
            )));
        }
        if booking.reserved_by.is_some() {
            return Err(AppError::Conflict(format!("booking {id} is being grouped, try again")));
        }
        booking.status = BookingStatus::Cancelled;
        Ok(())
    })?;

    state.notify(Event::BookingStatusChanged {
        booking_id: booking.id,
        status: booking.status,
    });
    state.refresh_gauges();

    Ok(Json(booking))
}

async fn retry_grouping(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupingResponse>, AppError> {
    let booking = state.store.booking(&id)?;
    let carpool_group = attempt_group(&state, &booking)?;
    Ok(Json(GroupingResponse { carpool_group }))
}
