pub mod directory;
pub mod jwt;
pub mod password;

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::jwt::{JwtError, JwtService};
use crate::error::AppError;
use crate::models::user::User;
use crate::state::AppState;

/// The active user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(JwtService::extract_from_header)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        let claims = state.jwt.validate(token).map_err(|err| match err {
            JwtError::ExpiredToken => AppError::Unauthorized("token expired".to_string()),
            _ => AppError::Unauthorized("could not validate credentials".to_string()),
        })?;

        let user = state
            .users
            .find_by_email(&claims.sub)
            .ok_or_else(|| AppError::Unauthorized("could not validate credentials".to_string()))?;

        if !user.is_active {
            return Err(AppError::BadRequest("inactive user".to_string()));
        }

        Ok(CurrentUser(user))
    }
}
