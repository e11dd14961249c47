use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::PageQuery;
use crate::auth::directory::UserChanges;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::user::User;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me).patch(update_me))
        .route("/users/:id", get(get_user))
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub default_delivery_address: Option<String>,
    pub default_delivery_city: Option<String>,
    pub password: Option<String>,
}

async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let updated = state.users.update(
        user.id,
        UserChanges {
            phone: payload.phone,
            full_name: payload.full_name,
            default_delivery_address: payload.default_delivery_address,
            default_delivery_city: payload.default_delivery_city,
            password: payload.password,
        },
        state.clock.now(),
    )?;

    Ok(Json(updated))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Json<Vec<User>> {
    Json(state.users.list(page.into()))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<User>, AppError> {
    state
        .users
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}
