use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub event_buffer_size: usize,
    pub matching: MatchingConfig,
}

/// Tunables of the grouping engine, the pending-booking sweeper and driver ranking.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub max_group_size: usize,
    pub pickup_radius_km: f64,
    pub dest_radius_km: f64,
    pub scan_limit: usize,
    pub retry_interval: Duration,
    /// Ungrouped carpool bookings older than this are expired. `None` keeps them forever.
    pub pending_ttl: Option<Duration>,
    pub weights: ScoringWeights,
}

/// Weights of the driver match score. The defaults reproduce
/// `distance + (diff / 180) * 2 - (rating - 4) * 2`.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub direction: f64,
    pub rating: f64,
    pub rating_baseline: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            direction: 2.0,
            rating: 2.0,
            rating_baseline: 4.0,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_group_size: 3,
            pickup_radius_km: 3.0,
            dest_radius_km: 4.0,
            scan_limit: 50,
            retry_interval: Duration::from_secs(30),
            pending_ttl: None,
            weights: ScoringWeights::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = MatchingConfig::default();
        let weights = ScoringWeights::default();

        let max_group_size = parse_or_default("CARPOOL_MAX_GROUP_SIZE", defaults.max_group_size)?;
        if max_group_size < 2 {
            return Err(AppError::Internal(
                "invalid CARPOOL_MAX_GROUP_SIZE: a group needs at least 2 members".to_string(),
            ));
        }

        let retry_secs: u64 =
            parse_or_default("CARPOOL_RETRY_INTERVAL_SECS", defaults.retry_interval.as_secs())?;
        if retry_secs == 0 {
            return Err(AppError::Internal(
                "invalid CARPOOL_RETRY_INTERVAL_SECS: must be > 0".to_string(),
            ));
        }

        let matching = MatchingConfig {
            max_group_size,
            pickup_radius_km: parse_or_default("CARPOOL_PICKUP_RADIUS_KM", defaults.pickup_radius_km)?,
            dest_radius_km: parse_or_default("CARPOOL_DEST_RADIUS_KM", defaults.dest_radius_km)?,
            scan_limit: parse_or_default("CARPOOL_SCAN_LIMIT", defaults.scan_limit)?,
            retry_interval: Duration::from_secs(retry_secs),
            pending_ttl: parse_optional::<u64>("CARPOOL_PENDING_TTL_SECS")?.map(Duration::from_secs),
            weights: ScoringWeights {
                direction: parse_or_default("MATCH_DIRECTION_WEIGHT", weights.direction)?,
                rating: parse_or_default("MATCH_RATING_WEIGHT", weights.rating)?,
                rating_baseline: parse_or_default("MATCH_RATING_BASELINE", weights.rating_baseline)?,
            },
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            matching,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
