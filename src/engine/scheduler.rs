use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::{advance_now, Trigger};
use crate::state::AppState;

/// Sweeps all orders every `sweep_interval` until `shutdown` fires. A failed
/// sweep is logged and retried on the next tick.
pub async fn run_sweep_scheduler(state: Arc<AppState>, shutdown: CancellationToken) {
    let period = Duration::from_secs(state.sweep_interval_secs.max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "sweep scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match advance_now(&state, Trigger::Sweep).await {
                    Ok(0) => {}
                    Ok(changed) => info!(changed, "sweep advanced orders"),
                    Err(err) => error!(error = %err, "sweep failed; retrying on next tick"),
                }
            }
        }
    }

    info!("sweep scheduler stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tokio::time::Duration;
    use tokio_util::sync::CancellationToken;

    use super::run_sweep_scheduler;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::models::order::{NewOrder, OrderStatus};
    use crate::state::AppState;
    use crate::store::{MemoryStore, OrderStore, Store, Transaction};

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_running_after_a_failed_tick() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let state = Arc::new(AppState::with_parts(
            &Config::default(),
            store.clone(),
            clock.clone(),
        ));

        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(NewOrder {
                user_id: 1,
                category: "tech".to_string(),
                description: "phone".to_string(),
                weight: None,
                delivery_address: "Elm st 3".to_string(),
                delivery_time: None,
                comment: None,
                created_at: start,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        store.set_available(false);
        clock.advance(ChronoDuration::seconds(61));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_sweep_scheduler(state.clone(), shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(15)).await;
        store.set_available(true);
        tokio::time::sleep(Duration::from_secs(10)).await;

        let mut tx = store.begin().await.unwrap();
        let current = tx.find_order(order.id).await.unwrap().unwrap();
        drop(tx);
        assert_eq!(current.status, OrderStatus::InDelivery);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
