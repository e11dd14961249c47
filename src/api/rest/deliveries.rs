use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::api::rest::PageQuery;
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus, NewDelivery};
use crate::state::AppState;
use crate::store::{DeliveryStore, OrderStore, Transaction};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery).patch(update_delivery))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_id: i64,
    pub drone_id: Option<String>,
    pub estimated_arrival: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct UpdateDeliveryRequest {
    pub status: Option<DeliveryStatus>,
    pub drone_id: Option<String>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    let mut tx = state.store.begin().await?;

    let order = tx
        .find_order(payload.order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", payload.order_id)))?;
    if tx
        .find_delivery_by_order_id(payload.order_id)
        .await?
        .is_some()
    {
        return Err(AppError::BadRequest(
            "delivery already exists for this order".to_string(),
        ));
    }

    let now = state.clock.now();
    let created = tx
        .insert_delivery(NewDelivery {
            order_id: order.id,
            drone_id: payload.drone_id,
            status: DeliveryStatus::Assigned,
            estimated_arrival: payload.estimated_arrival,
            actual_arrival: None,
            created_at: now,
        })
        .await?;
    // An order already past pending gets a delivery that matches it.
    let delivery = state
        .engine
        .reconcile_delivery(tx.as_mut(), &order, now)
        .await?
        .unwrap_or(created);
    tx.commit().await?;

    info!(delivery_id = delivery.id, order_id = delivery.order_id, "delivery created");
    Ok((StatusCode::CREATED, Json(delivery)))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    let mut tx = state.store.begin().await?;
    Ok(Json(tx.list_deliveries(page.into()).await?))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Delivery>, AppError> {
    let mut tx = state.store.begin().await?;
    tx.find_delivery(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
}

async fn update_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    let mut tx = state.store.begin().await?;
    let mut delivery = tx
        .find_delivery(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    if let Some(status) = payload.status {
        if !delivery.status.can_become(status) {
            return Err(AppError::Conflict(format!(
                "delivery {id} cannot go from {} back to {}",
                delivery.status.as_str(),
                status.as_str()
            )));
        }

        let order = tx.find_order(delivery.order_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("order {} not found", delivery.order_id))
        })?;
        let ceiling = DeliveryStatus::for_order(order.status).unwrap_or(DeliveryStatus::Assigned);
        if status > ceiling {
            return Err(AppError::Conflict(format!(
                "delivery {id} cannot be {} while order {} is {}",
                status.as_str(),
                order.id,
                order.status.as_str()
            )));
        }
        delivery.status = status;
    }
    if let Some(drone_id) = payload.drone_id {
        delivery.drone_id = Some(drone_id);
    }
    if let Some(eta) = payload.estimated_arrival {
        delivery.estimated_arrival = Some(eta);
    }
    if let Some(arrival) = payload.actual_arrival {
        delivery.actual_arrival = Some(arrival);
    }
    delivery.updated_at = Some(state.clock.now());

    tx.save_delivery(&delivery).await?;
    tx.commit().await?;

    Ok(Json(delivery))
}
