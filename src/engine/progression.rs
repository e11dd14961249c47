use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::Timing;
use crate::engine::drone::generate_drone_id;
use crate::models::delivery::{Delivery, DeliveryStatus, NewDelivery};
use crate::models::event::OrderEvent;
use crate::models::order::{Order, OrderStatus};
use crate::store::{DeliveryStore, OrderStore, Store, StoreError, Transaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub dispatched: usize,
    pub delivered: usize,
}

impl AdvanceReport {
    pub fn changed(&self) -> usize {
        self.dispatched + self.delivered
    }
}

/// Moves orders through pending -> in_delivery -> delivered as their age
/// crosses the configured thresholds, keeping each order's delivery record
/// in step. Every invocation is one store transaction.
pub struct ProgressionEngine {
    store: Arc<dyn Store>,
    timing: Timing,
    events_tx: broadcast::Sender<OrderEvent>,
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        timing: Timing,
        events_tx: broadcast::Sender<OrderEvent>,
    ) -> Self {
        Self {
            store,
            timing,
            events_tx,
        }
    }

    /// Returns how many orders changed status.
    pub async fn advance(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.advance_detailed(now).await.map(|report| report.changed())
    }

    pub async fn advance_detailed(&self, now: DateTime<Utc>) -> Result<AdvanceReport, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut events = Vec::new();

        let report = match self.apply(tx.as_mut(), now, &mut events).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "advance failed; rolled back");
                return Err(err);
            }
        };

        if report.changed() == 0 {
            return Ok(report);
        }

        if let Err(err) = tx.commit().await {
            error!(error = %err, changed = report.changed(), "advance commit failed; rolled back");
            return Err(err);
        }

        info!(
            dispatched = report.dispatched,
            delivered = report.delivered,
            "order statuses advanced"
        );

        for event in events {
            let _ = self.events_tx.send(event);
        }

        Ok(report)
    }

    async fn apply(
        &self,
        tx: &mut (dyn Transaction + '_),
        now: DateTime<Utc>,
        events: &mut Vec<OrderEvent>,
    ) -> Result<AdvanceReport, StoreError> {
        // Both candidate sets are taken before any write, so an order moves
        // at most one phase per invocation.
        let due_for_dispatch = tx
            .find_orders_by_status_older_than(OrderStatus::Pending, now - self.timing.dispatch_after)
            .await?;
        let due_for_delivery = tx
            .find_orders_by_status_older_than(
                OrderStatus::InDelivery,
                now - self.timing.deliver_after,
            )
            .await?;

        let mut report = AdvanceReport::default();

        for order in due_for_dispatch {
            let event = self.transition(tx, order, OrderStatus::InDelivery, now).await?;
            events.push(event);
            report.dispatched += 1;
        }

        for order in due_for_delivery {
            let event = self.transition(tx, order, OrderStatus::Delivered, now).await?;
            events.push(event);
            report.delivered += 1;
        }

        Ok(report)
    }

    async fn transition(
        &self,
        tx: &mut (dyn Transaction + '_),
        mut order: Order,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<OrderEvent, StoreError> {
        order.status = status;
        order.updated_at = Some(now);
        tx.save_order(&order).await?;

        let drone_id = self
            .reconcile_delivery(tx, &order, now)
            .await?
            .and_then(|delivery| delivery.drone_id);

        info!(
            order_id = order.id,
            status = status.as_str(),
            drone_id = drone_id.as_deref().unwrap_or_default(),
            "order advanced"
        );

        Ok(OrderEvent {
            order_id: order.id,
            status,
            drone_id,
            at: now,
        })
    }

    /// Brings the order's delivery up to the status the order implies,
    /// creating it if the order is past pending and has none. A delivery is
    /// never moved backwards and is only written when something changes.
    pub async fn reconcile_delivery(
        &self,
        tx: &mut (dyn Transaction + '_),
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<Option<Delivery>, StoreError> {
        let existing = tx.find_delivery_by_order_id(order.id).await?;
        let Some(target) = DeliveryStatus::for_order(order.status) else {
            return Ok(existing);
        };

        let Some(mut delivery) = existing else {
            let delivery = tx
                .insert_delivery(NewDelivery {
                    order_id: order.id,
                    drone_id: Some(generate_drone_id()),
                    status: target,
                    estimated_arrival: (target == DeliveryStatus::InTransit)
                        .then(|| now + self.timing.flight_eta),
                    actual_arrival: (target == DeliveryStatus::Delivered).then_some(now),
                    created_at: now,
                })
                .await?;

            info!(
                order_id = order.id,
                delivery_id = delivery.id,
                status = target.as_str(),
                "delivery created"
            );
            return Ok(Some(delivery));
        };

        if delivery.status >= target {
            return Ok(Some(delivery));
        }

        delivery.status = target;
        if delivery.drone_id.is_none() {
            delivery.drone_id = Some(generate_drone_id());
        }
        match target {
            DeliveryStatus::InTransit => {
                if delivery.estimated_arrival.is_none() {
                    delivery.estimated_arrival = Some(now + self.timing.flight_eta);
                }
            }
            DeliveryStatus::Delivered => {
                if delivery.actual_arrival.is_none() {
                    delivery.actual_arrival = Some(now);
                }
            }
            DeliveryStatus::Assigned => {}
        }
        delivery.updated_at = Some(now);
        tx.save_delivery(&delivery).await?;

        info!(
            order_id = order.id,
            delivery_id = delivery.id,
            status = target.as_str(),
            "delivery moved forward"
        );
        Ok(Some(delivery))
    }
}
