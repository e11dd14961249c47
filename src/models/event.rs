use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::OrderStatus;

/// Published after a transition has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: i64,
    pub status: OrderStatus,
    pub drone_id: Option<String>,
    pub at: DateTime<Utc>,
}
