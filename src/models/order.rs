use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::delivery::Delivery;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InDelivery,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Status only ever moves forward; staying put is allowed.
    pub fn can_become(&self, next: OrderStatus) -> bool {
        next >= *self
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(OrderStatus::Pending),
            "in_delivery" => Ok(OrderStatus::InDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(format!("unknown order status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub status: OrderStatus,
    pub description: String,
    pub weight: Option<f64>,
    pub delivery_address: String,
    pub delivery_time: Option<String>,
    pub comment: Option<String>,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub category: String,
    pub description: String,
    pub weight: Option<f64>,
    pub delivery_address: String,
    pub delivery_time: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An order together with its delivery record, fetched explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub delivery: Option<Delivery>,
}

pub fn price_for_category(category: &str) -> Decimal {
    let amount = match category {
        "food" => 199,
        "medicine" => 399,
        "parcels" => 299,
        "tech" => 499,
        "gifts" => 599,
        "documents" => 149,
        _ => 199,
    };
    Decimal::from(amount)
}
