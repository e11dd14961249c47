use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::directory::NewUser;
use crate::error::AppError;
use crate::models::user::User;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub phone: String,
    pub full_name: String,
    pub password: String,
    pub default_delivery_address: Option<String>,
    pub default_delivery_city: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.users.register(
        NewUser {
            email: payload.email,
            phone: payload.phone,
            full_name: payload.full_name,
            password: payload.password,
            default_delivery_address: payload.default_delivery_address,
            default_delivery_city: payload.default_delivery_city,
        },
        state.clock.now(),
    )?;

    info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state
        .users
        .authenticate(&payload.email, &payload.password)
        .ok_or_else(|| AppError::Unauthorized("incorrect email or password".to_string()))?;

    let access_token = state
        .jwt
        .issue(&user.email, state.clock.now())
        .map_err(|err| AppError::Internal(err.to_string()))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}
