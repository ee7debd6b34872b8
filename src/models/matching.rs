use serde::{Deserialize, Serialize};

use crate::models::group::CarpoolGroup;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub distance_km: f64,
    pub avg_rating: f64,
    pub direction_penalty: f64,
}

/// An open group as seen by one driver. Lower `score` is a better match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub group: CarpoolGroup,
    pub score: f64,
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
}
