use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

pub const ACTOR_HEADER: &str = "x-user-id";

/// The user on whose behalf a request is made. Session handling lives in
/// front of this service; it forwards the authenticated id in `x-user-id`.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {ACTOR_HEADER} header")))?
            .to_str()
            .map_err(|_| AppError::Unauthorized(format!("malformed {ACTOR_HEADER} header")))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|err| AppError::Unauthorized(format!("malformed {ACTOR_HEADER} header: {err}")))?;

        Ok(Actor(id))
    }
}
