use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::Actor;
use crate::engine::lifecycle::{self, TripSignal};
use crate::engine::ranking::{rank_groups_for_driver, DriverPosition};
use crate::error::AppError;
use crate::models::{CarpoolGroup, GeoPoint, ScoredMatch};
use crate::state::AppState;
use crate::store::ResolvedGroup;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/carpool/open", get(list_open_groups))
        .route("/carpool/:id", get(get_group))
        .route("/carpool/:id/accept", post(accept_group))
        .route("/carpool/:id/location", post(update_location))
        .route("/carpool/:id/status", post(update_status))
        .route("/carpool/:id/rate", post(rate_group))
        .route("/carpool/:id/cancel", post(cancel_group))
        .route("/driver/matches", get(driver_matches))
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: TripSignal,
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: i64,
}

#[derive(Deserialize)]
pub struct MatchQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub dest_lat: Option<f64>,
    pub dest_lng: Option<f64>,
}

impl MatchQuery {
    fn into_position(self) -> Result<DriverPosition, AppError> {
        let (Some(lat), Some(lng)) = (self.lat, self.lng) else {
            return Err(AppError::Validation("lat and lng are required".to_string()));
        };
        let location = GeoPoint { lat, lng };
        if !location.is_valid() {
            return Err(AppError::Validation("lat/lng out of range".to_string()));
        }

        let destination = match (self.dest_lat, self.dest_lng) {
            (Some(lat), Some(lng)) => {
                let dest = GeoPoint { lat, lng };
                if !dest.is_valid() {
                    return Err(AppError::Validation("dest_lat/dest_lng out of range".to_string()));
                }
                Some(dest)
            }
            (None, None) => None,
            _ => {
                return Err(AppError::Validation(
                    "dest_lat and dest_lng must be given together".to_string(),
                ));
            }
        };

        Ok(DriverPosition { location, destination })
    }
}

async fn list_open_groups(State(state): State<Arc<AppState>>) -> Json<Vec<ResolvedGroup>> {
    Json(state.store.open_groups())
}

async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolvedGroup>, AppError> {
    let group = state.store.group(&id)?;
    Ok(Json(state.store.resolve(group)))
}

async fn accept_group(
    State(state): State<Arc<AppState>>,
    Actor(driver_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<CarpoolGroup>, AppError> {
    Ok(Json(lifecycle::accept_group(&state, &id, driver_id)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationRequest>,
) -> Result<Json<CarpoolGroup>, AppError> {
    let point = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    Ok(Json(lifecycle::update_location(&state, &id, actor, point)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<CarpoolGroup>, AppError> {
    Ok(Json(lifecycle::update_status(&state, &id, actor, payload.status)?))
}

async fn rate_group(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<CarpoolGroup>, AppError> {
    Ok(Json(lifecycle::rate_group(&state, &id, actor, payload.rating)?))
}

async fn cancel_group(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<CarpoolGroup>, AppError> {
    Ok(Json(lifecycle::cancel_group(&state, &id, actor)?))
}

async fn driver_matches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Vec<ScoredMatch>>, AppError> {
    let position = query.into_position()?;
    Ok(Json(rank_groups_for_driver(&state, &position)))
}
