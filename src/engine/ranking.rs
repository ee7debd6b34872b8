use crate::config::ScoringWeights;
use crate::engine::fare::{round1, round2};
use crate::geo::{bearing_degrees, bearing_difference, haversine_km};
use crate::models::user::DEFAULT_RATING;
use crate::models::{GeoPoint, ScoreBreakdown, ScoredMatch};
use crate::store::ResolvedGroup;
use crate::state::AppState;

/// Where a driver is and, optionally, where they are heading.
#[derive(Debug, Clone, Copy)]
pub struct DriverPosition {
    pub location: GeoPoint,
    pub destination: Option<GeoPoint>,
}

/// Ranks every open group for a driver, best match first.
pub fn rank_groups_for_driver(state: &AppState, driver: &DriverPosition) -> Vec<ScoredMatch> {
    rank_groups(state.store.open_groups(), driver, &state.matching.weights)
}

pub fn rank_groups(
    groups: Vec<ResolvedGroup>,
    driver: &DriverPosition,
    weights: &ScoringWeights,
) -> Vec<ScoredMatch> {
    let mut scored: Vec<ScoredMatch> = groups
        .into_iter()
        .map(|resolved| {
            let (score, breakdown) = compute_score(&resolved, driver, weights);
            ScoredMatch {
                group: resolved.group,
                score,
                breakdown,
            }
        })
        .collect();

    // sort_by is stable, so equal scores keep the store's oldest-first order.
    scored.sort_by(|a, b| a.score.total_cmp(&b.score));
    scored
}

/// Lower is better. The returned breakdown is rounded for display; the score is not.
pub fn compute_score(
    resolved: &ResolvedGroup,
    driver: &DriverPosition,
    weights: &ScoringWeights,
) -> (f64, ScoreBreakdown) {
    let group = &resolved.group;

    let distance_km = group
        .pickup_centroid
        .map(|pickup| haversine_km(&driver.location, &pickup))
        .unwrap_or(0.0);

    let avg_rating = average_rating(resolved);
    let direction_penalty = direction_penalty(resolved, driver, weights);

    let score =
        distance_km + direction_penalty - (avg_rating - weights.rating_baseline) * weights.rating;

    let breakdown = ScoreBreakdown {
        distance_km: round2(distance_km),
        avg_rating: round1(avg_rating),
        direction_penalty: round2(direction_penalty),
    };

    (score, breakdown)
}

fn average_rating(resolved: &ResolvedGroup) -> f64 {
    if resolved.members.is_empty() {
        return DEFAULT_RATING;
    }

    let total: f64 = resolved
        .members
        .iter()
        .map(|member| member.user.as_ref().map_or(DEFAULT_RATING, |user| user.rating))
        .sum();

    total / resolved.members.len() as f64
}

fn direction_penalty(resolved: &ResolvedGroup, driver: &DriverPosition, weights: &ScoringWeights) -> f64 {
    let group = &resolved.group;
    let (Some(driver_dest), Some(pickup), Some(dest)) = (
        driver.destination,
        group.pickup_centroid,
        group.destination_centroid,
    ) else {
        return 0.0;
    };

    let driver_heading = bearing_degrees(&driver.location, &driver_dest);
    let group_heading = bearing_degrees(&pickup, &dest);

    bearing_difference(driver_heading, group_heading) / 180.0 * weights.direction
}
