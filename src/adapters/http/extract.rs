//! Request extractors shared by the billing routes.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::app_error::AppError;

/// Set by the identity layer in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or(AppError::InvalidCredentials)?;
        Ok(AuthenticatedUser(user_id))
    }
}
