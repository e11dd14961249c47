use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::api::rest::PageQuery;
use crate::auth::CurrentUser;
use crate::engine::{advance_now, Trigger};
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::order::{NewOrder, Order, OrderStatus, OrderView};
use crate::state::AppState;
use crate::store::{DeliveryStore, OrderFilter, OrderStore, StoreError, Transaction};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/my", get(list_my_orders))
        .route(
            "/orders/:id",
            get(get_order).patch(update_order).delete(delete_order),
        )
        .route("/orders/:id/delivery", get(get_order_delivery))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub category: String,
    pub description: String,
    pub delivery_address: Option<String>,
    pub delivery_time: Option<String>,
    pub comment: Option<String>,
    pub weight: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub description: Option<String>,
    pub delivery_address: Option<String>,
    pub delivery_time: Option<String>,
    pub comment: Option<String>,
    pub weight: Option<f64>,
}

async fn view(tx: &mut (dyn Transaction + '_), order: Order) -> Result<OrderView, StoreError> {
    let delivery = tx.find_delivery_by_order_id(order.id).await?;
    Ok(OrderView { order, delivery })
}

async fn views(
    tx: &mut (dyn Transaction + '_),
    orders: Vec<Order>,
) -> Result<Vec<OrderView>, StoreError> {
    let mut out = Vec::with_capacity(orders.len());
    for order in orders {
        out.push(view(tx, order).await?);
    }
    Ok(out)
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    if payload.category.trim().is_empty() {
        return Err(AppError::BadRequest("category cannot be empty".to_string()));
    }

    let delivery_address = payload
        .delivery_address
        .filter(|address| !address.trim().is_empty())
        .or_else(|| user.default_delivery_address.clone())
        .ok_or_else(|| AppError::BadRequest("delivery_address is required".to_string()))?;

    let mut tx = state.store.begin().await?;
    let order = tx
        .insert_order(NewOrder {
            user_id: user.id,
            category: payload.category,
            description: payload.description,
            weight: payload.weight,
            delivery_address,
            delivery_time: Some(payload.delivery_time.unwrap_or_else(|| "asap".to_string())),
            comment: payload.comment,
            created_at: state.clock.now(),
        })
        .await?;
    tx.commit().await?;

    info!(order_id = order.id, user_id = user.id, category = %order.category, "order created");

    Ok((
        StatusCode::CREATED,
        Json(OrderView {
            order,
            delivery: None,
        }),
    ))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    advance_now(&state, Trigger::Read).await?;

    let mut tx = state.store.begin().await?;
    let orders = tx
        .list_orders(OrderFilter {
            user_id: None,
            page: page.into(),
        })
        .await?;

    Ok(Json(views(tx.as_mut(), orders).await?))
}

async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    advance_now(&state, Trigger::Read).await?;

    let mut tx = state.store.begin().await?;
    let orders = tx
        .list_orders(OrderFilter {
            user_id: Some(user.id),
            page: page.into(),
        })
        .await?;

    Ok(Json(views(tx.as_mut(), orders).await?))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderView>, AppError> {
    advance_now(&state, Trigger::Read).await?;

    let mut tx = state.store.begin().await?;
    let order = tx
        .find_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(view(tx.as_mut(), order).await?))
}

async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateOrderRequest>,
) -> Result<Json<OrderView>, AppError> {
    advance_now(&state, Trigger::Read).await?;
    let now = state.clock.now();

    let mut tx = state.store.begin().await?;
    let mut order = tx
        .find_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    if let Some(status) = payload.status {
        if !order.status.can_become(status) {
            return Err(AppError::Conflict(format!(
                "order {id} cannot go from {} back to {}",
                order.status.as_str(),
                status.as_str()
            )));
        }
        order.status = status;
    }
    if let Some(description) = payload.description {
        order.description = description;
    }
    if let Some(address) = payload.delivery_address {
        order.delivery_address = address;
    }
    if let Some(delivery_time) = payload.delivery_time {
        order.delivery_time = Some(delivery_time);
    }
    if let Some(comment) = payload.comment {
        order.comment = Some(comment);
    }
    if let Some(weight) = payload.weight {
        order.weight = Some(weight);
    }
    order.updated_at = Some(now);
    tx.save_order(&order).await?;

    let delivery = state
        .engine
        .reconcile_delivery(tx.as_mut(), &order, now)
        .await?;
    tx.commit().await?;

    Ok(Json(OrderView { order, delivery }))
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    advance_now(&state, Trigger::Read).await?;

    let mut tx = state.store.begin().await?;
    if !tx.delete_order(id).await? {
        return Err(AppError::NotFound(format!("order {id} not found")));
    }
    tx.commit().await?;

    info!(order_id = id, "order deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_order_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Delivery>, AppError> {
    advance_now(&state, Trigger::Read).await?;

    let mut tx = state.store.begin().await?;
    tx.find_delivery_by_order_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("delivery for order {id} not found")))
}
