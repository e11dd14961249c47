//! Persistence contracts for orders and deliveries.
//!
//! All access goes through a [`Transaction`] obtained from [`Store::begin`].
//! Writes become visible to other transactions only after
//! [`Transaction::commit`]; dropping a transaction without committing
//! discards everything it did.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::models::delivery::{Delivery, NewDelivery};
use crate::models::order::{NewOrder, Order, OrderStatus};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("stored row is invalid: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<i64>,
    pub page: Page,
}

#[async_trait]
pub trait OrderStore: Send {
    /// Orders in `status` created at or before `threshold`.
    async fn find_orders_by_status_older_than(
        &mut self,
        status: OrderStatus,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError>;

    async fn find_order(&mut self, id: i64) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    async fn list_orders(&mut self, filter: OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn count_orders(&mut self) -> Result<usize, StoreError>;

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, StoreError>;

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Removes the order and its delivery. Returns false if the order did not exist.
    async fn delete_order(&mut self, id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait DeliveryStore: Send {
    async fn find_delivery_by_order_id(
        &mut self,
        order_id: i64,
    ) -> Result<Option<Delivery>, StoreError>;

    async fn find_delivery(&mut self, id: i64) -> Result<Option<Delivery>, StoreError>;

    /// Newest first.
    async fn list_deliveries(&mut self, page: Page) -> Result<Vec<Delivery>, StoreError>;

    async fn count_deliveries(&mut self) -> Result<usize, StoreError>;

    /// Fails with [`StoreError::Constraint`] if the order is missing or
    /// already has a delivery.
    async fn insert_delivery(&mut self, delivery: NewDelivery) -> Result<Delivery, StoreError>;

    async fn save_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Transaction: OrderStore + DeliveryStore {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Transactions are isolated from each other: a row read and written by
    /// one transaction cannot be written by another until the first ends.
    async fn begin<'a>(&'a self) -> Result<Box<dyn Transaction + 'a>, StoreError>;
}

/// Postgres when `database_url` is configured, otherwise an in-process store
/// that does not survive a restart.
pub async fn open(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, orders are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
