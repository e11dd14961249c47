use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub phone: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub default_delivery_address: Option<String>,
    pub default_delivery_city: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
