use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::models::delivery::{Delivery, NewDelivery};
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::store::{DeliveryStore, OrderFilter, OrderStore, Page, Store, StoreError, Transaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: BTreeMap<i64, Order>,
    deliveries: BTreeMap<i64, Delivery>,
    last_order_id: i64,
    last_delivery_id: i64,
}

/// In-process store. Transactions are serialized: `begin` holds the table
/// lock until the transaction commits or is dropped, and works on a private
/// copy that replaces the tables only on commit.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable, `begin` and `commit` fail with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn Transaction + 'a>, StoreError> {
        self.check_available()?;
        let guard = self.tables.lock().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTransaction {
            store: self,
            guard,
            working,
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    guard: MutexGuard<'a, Tables>,
    working: Tables,
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items.into_iter().skip(page.skip).take(page.limit).collect()
}

#[async_trait]
impl<'a> OrderStore for MemoryTransaction<'a> {
    async fn find_orders_by_status_older_than(
        &mut self,
        status: OrderStatus,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|order| order.status == status && order.created_at <= threshold)
            .cloned()
            .collect())
    }

    async fn find_order(&mut self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn list_orders(&mut self, filter: OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|order| filter.user_id.is_none_or(|user_id| order.user_id == user_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(paginate(orders, filter.page))
    }

    async fn count_orders(&mut self) -> Result<usize, StoreError> {
        Ok(self.working.orders.len())
    }

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, StoreError> {
        self.working.last_order_id += 1;
        let price = crate::models::order::price_for_category(&new.category);

        let order = Order {
            id: self.working.last_order_id,
            user_id: new.user_id,
            category: new.category,
            status: OrderStatus::Pending,
            description: new.description,
            weight: new.weight,
            delivery_address: new.delivery_address,
            delivery_time: new.delivery_time,
            comment: new.comment,
            price,
            created_at: new.created_at,
            updated_at: None,
        };

        self.working.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        match self.working.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::Constraint(format!(
                "order {} does not exist",
                order.id
            ))),
        }
    }

    async fn delete_order(&mut self, id: i64) -> Result<bool, StoreError> {
        if self.working.orders.remove(&id).is_none() {
            return Ok(false);
        }
        self.working
            .deliveries
            .retain(|_, delivery| delivery.order_id != id);
        Ok(true)
    }
}

#[async_trait]
impl<'a> DeliveryStore for MemoryTransaction<'a> {
    async fn find_delivery_by_order_id(
        &mut self,
        order_id: i64,
    ) -> Result<Option<Delivery>, StoreError> {
        Ok(self
            .working
            .deliveries
            .values()
            .find(|delivery| delivery.order_id == order_id)
            .cloned())
    }

    async fn find_delivery(&mut self, id: i64) -> Result<Option<Delivery>, StoreError> {
        Ok(self.working.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(&mut self, page: Page) -> Result<Vec<Delivery>, StoreError> {
        let mut deliveries: Vec<Delivery> = self.working.deliveries.values().cloned().collect();
        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(paginate(deliveries, page))
    }

    async fn count_deliveries(&mut self) -> Result<usize, StoreError> {
        Ok(self.working.deliveries.len())
    }

    async fn insert_delivery(&mut self, new: NewDelivery) -> Result<Delivery, StoreError> {
        if !self.working.orders.contains_key(&new.order_id) {
            return Err(StoreError::Constraint(format!(
                "order {} does not exist",
                new.order_id
            )));
        }
        if self
            .working
            .deliveries
            .values()
            .any(|delivery| delivery.order_id == new.order_id)
        {
            return Err(StoreError::Constraint(format!(
                "order {} already has a delivery",
                new.order_id
            )));
        }

        self.working.last_delivery_id += 1;
        let delivery = Delivery {
            id: self.working.last_delivery_id,
            order_id: new.order_id,
            drone_id: new.drone_id,
            status: new.status,
            estimated_arrival: new.estimated_arrival,
            actual_arrival: new.actual_arrival,
            created_at: new.created_at,
            updated_at: None,
        };

        self.working.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn save_delivery(&mut self, delivery: &Delivery) -> Result<(), StoreError> {
        let clashes = self
            .working
            .deliveries
            .values()
            .any(|other| other.order_id == delivery.order_id && other.id != delivery.id);
        if clashes {
            return Err(StoreError::Constraint(format!(
                "order {} already has a delivery",
                delivery.order_id
            )));
        }

        match self.working.deliveries.get_mut(&delivery.id) {
            Some(existing) => {
                *existing = delivery.clone();
                Ok(())
            }
            None => Err(StoreError::Constraint(format!(
                "delivery {} does not exist",
                delivery.id
            ))),
        }
    }
}

#[async_trait]
impl<'a> Transaction for MemoryTransaction<'a> {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            store,
            mut guard,
            working,
        } = *self;

        store.check_available()?;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::MemoryStore;
    use crate::models::delivery::{DeliveryStatus, NewDelivery};
    use crate::models::order::{NewOrder, OrderStatus};
    use crate::store::{
        DeliveryStore, OrderFilter, OrderStore, Page, Store, StoreError, Transaction,
    };

    fn new_order(user_id: i64, minutes: i64) -> NewOrder {
        NewOrder {
            user_id,
            category: "food".to_string(),
            description: "soup".to_string(),
            weight: None,
            delivery_address: "Main st 1".to_string(),
            delivery_time: Some("asap".to_string()),
            comment: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    fn new_delivery(order_id: i64) -> NewDelivery {
        NewDelivery {
            order_id,
            drone_id: Some("DRONE-ABC123".to_string()),
            status: DeliveryStatus::Assigned,
            estimated_arrival: None,
            actual_arrival: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_rolled_back_on_drop() {
        let store = MemoryStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_order(new_order(1, 0)).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_orders().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_transactions() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(new_order(1, 0)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(found.status, OrderStatus::Pending);
        assert_eq!(found.price, rust_decimal::Decimal::from(199));
    }

    #[tokio::test]
    async fn at_most_one_delivery_per_order() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(new_order(1, 0)).await.unwrap();

        tx.insert_delivery(new_delivery(order.id)).await.unwrap();
        let err = tx.insert_delivery(new_delivery(order.id)).await.unwrap_err();

        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn delivery_requires_existing_order() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = tx.insert_delivery(new_delivery(42)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn list_orders_is_newest_first_and_filtered_by_user() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(new_order(1, 0)).await.unwrap();
        tx.insert_order(new_order(2, 1)).await.unwrap();
        tx.insert_order(new_order(1, 2)).await.unwrap();

        let all = tx.list_orders(OrderFilter::default()).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let mine = tx
            .list_orders(OrderFilter {
                user_id: Some(1),
                page: Page { skip: 0, limit: 1 },
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, 3);
    }

    #[tokio::test]
    async fn status_query_uses_inclusive_threshold() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(new_order(1, 0)).await.unwrap();

        let at_threshold = tx
            .find_orders_by_status_older_than(OrderStatus::Pending, order.created_at)
            .await
            .unwrap();
        let before = tx
            .find_orders_by_status_older_than(
                OrderStatus::Pending,
                order.created_at - Duration::seconds(1),
            )
            .await
            .unwrap();

        assert_eq!(at_threshold.len(), 1);
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn deleting_an_order_removes_its_delivery() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(new_order(1, 0)).await.unwrap();
        tx.insert_delivery(new_delivery(order.id)).await.unwrap();

        assert!(tx.delete_order(order.id).await.unwrap());
        assert!(!tx.delete_order(order.id).await.unwrap());
        assert_eq!(tx.count_deliveries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn offline_store_refuses_transactions() {
        let store = MemoryStore::new();
        store.set_available(false);

        let err = store.begin().await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn commit_fails_if_store_goes_offline_mid_transaction() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(new_order(1, 0)).await.unwrap();

        store.set_available(false);
        assert!(tx.commit().await.is_err());
        store.set_available(true);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_orders().await.unwrap(), 0);
    }
}
