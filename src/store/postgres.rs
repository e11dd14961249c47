//! PostgreSQL store. Every [`Transaction`] is a database transaction, and
//! single-row lookups plus the engine's candidate selection take `FOR UPDATE`
//! locks, so concurrent engine runs and manual edits serialize on the rows
//! they touch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::info;

use crate::models::delivery::{Delivery, DeliveryStatus, NewDelivery};
use crate::models::order::{price_for_category, NewOrder, Order, OrderStatus};
use crate::store::{DeliveryStore, OrderFilter, OrderStore, Page, Store, StoreError, Transaction};

const ORDER_COLUMNS: &str = "id, user_id, category, status, description, weight, \
     delivery_address, delivery_time, comment, price, created_at, updated_at";

const DELIVERY_COLUMNS: &str =
    "id, order_id, drone_id, status, estimated_arrival, actual_arrival, created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and applies pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::Unavailable(format!("migration failed: {err}")))?;

        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() || db.is_foreign_key_violation() {
                return StoreError::Constraint(db.message().to_string());
            }
        }
        StoreError::Unavailable(err.to_string())
    }
}

fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    category: String,
    status: String,
    description: String,
    weight: Option<f64>,
    delivery_address: String,
    delivery_time: Option<String>,
    comment: Option<String>,
    price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|err| StoreError::Corrupt(format!("order {}: {err}", row.id)))?;

        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            category: row.category,
            status,
            description: row.description,
            weight: row.weight,
            delivery_address: row.delivery_address,
            delivery_time: row.delivery_time,
            comment: row.comment,
            price: row.price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    order_id: i64,
    drone_id: Option<String>,
    status: String,
    estimated_arrival: Option<DateTime<Utc>>,
    actual_arrival: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<DeliveryStatus>()
            .map_err(|err| StoreError::Corrupt(format!("delivery {}: {err}", row.id)))?;

        Ok(Delivery {
            id: row.id,
            order_id: row.order_id,
            drone_id: row.drone_id,
            status,
            estimated_arrival: row.estimated_arrival,
            actual_arrival: row.actual_arrival,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn Transaction + 'a>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderStore for PgTransaction {
    async fn find_orders_by_status_older_than(
        &mut self,
        status: OrderStatus,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE status = $1 AND created_at <= $2 ORDER BY id FOR UPDATE"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .bind(threshold)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn find_order(&mut self, id: i64) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&mut self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(filter.user_id)
            .bind(to_sql_count(filter.page.limit))
            .bind(to_sql_count(filter.page.skip))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn count_orders(&mut self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, StoreError> {
        let price = price_for_category(&new.category);
        let sql = format!(
            "INSERT INTO orders (user_id, category, status, description, weight, \
             delivery_address, delivery_time, comment, price, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {ORDER_COLUMNS}"
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(new.user_id)
            .bind(&new.category)
            .bind(OrderStatus::Pending.as_str())
            .bind(&new.description)
            .bind(new.weight)
            .bind(&new.delivery_address)
            .bind(&new.delivery_time)
            .bind(&new.comment)
            .bind(price)
            .bind(new.created_at)
            .fetch_one(&mut *self.tx)
            .await?;

        Order::try_from(row)
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET category = $2, status = $3, description = $4, weight = $5, \
             delivery_address = $6, delivery_time = $7, comment = $8, price = $9, \
             updated_at = $10 WHERE id = $1",
        )
        .bind(order.id)
        .bind(&order.category)
        .bind(order.status.as_str())
        .bind(&order.description)
        .bind(order.weight)
        .bind(&order.delivery_address)
        .bind(&order.delivery_time)
        .bind(&order.comment)
        .bind(order.price)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "order {} does not exist",
                order.id
            )));
        }
        Ok(())
    }

    async fn delete_order(&mut self, id: i64) -> Result<bool, StoreError> {
        // deliveries.order_id cascades
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DeliveryStore for PgTransaction {
    async fn find_delivery_by_order_id(
        &mut self,
        order_id: i64,
    ) -> Result<Option<Delivery>, StoreError> {
        let sql =
            format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE order_id = $1 FOR UPDATE");
        let row: Option<DeliveryRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn find_delivery(&mut self, id: i64) -> Result<Option<Delivery>, StoreError> {
        let sql = format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = $1 FOR UPDATE");
        let row: Option<DeliveryRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn list_deliveries(&mut self, page: Page) -> Result<Vec<Delivery>, StoreError> {
        let sql = format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries \
             ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let rows: Vec<DeliveryRow> = sqlx::query_as(&sql)
            .bind(to_sql_count(page.limit))
            .bind(to_sql_count(page.skip))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(Delivery::try_from).collect()
    }

    async fn count_deliveries(&mut self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deliveries")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn insert_delivery(&mut self, new: NewDelivery) -> Result<Delivery, StoreError> {
        let sql = format!(
            "INSERT INTO deliveries (order_id, drone_id, status, estimated_arrival, \
             actual_arrival, created_at) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        let row: DeliveryRow = sqlx::query_as(&sql)
            .bind(new.order_id)
            .bind(&new.drone_id)
            .bind(new.status.as_str())
            .bind(new.estimated_arrival)
            .bind(new.actual_arrival)
            .bind(new.created_at)
            .fetch_one(&mut *self.tx)
            .await?;

        Delivery::try_from(row)
    }

    async fn save_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE deliveries SET order_id = $2, drone_id = $3, status = $4, \
             estimated_arrival = $5, actual_arrival = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(delivery.id)
        .bind(delivery.order_id)
        .bind(&delivery.drone_id)
        .bind(delivery.status.as_str())
        .bind(delivery.estimated_arrival)
        .bind(delivery.actual_arrival)
        .bind(delivery.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "delivery {} does not exist",
                delivery.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
