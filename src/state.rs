use std::sync::Arc;

use tokio::sync::broadcast;

use crate::auth::directory::UserDirectory;
use crate::auth::jwt::JwtService;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::progression::ProgressionEngine;
use crate::models::event::OrderEvent;
use crate::observability::metrics::Metrics;
use crate::store::{self, Store, StoreError};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: ProgressionEngine,
    pub clock: Arc<dyn Clock>,
    pub users: UserDirectory,
    pub jwt: JwtService,
    pub order_events_tx: broadcast::Sender<OrderEvent>,
    pub metrics: Metrics,
    pub sweep_interval_secs: u64,
}

impl AppState {
    /// Opens the configured store and runs on the system clock.
    pub async fn new(config: &Config) -> Result<Self, StoreError> {
        let store = store::open(config).await?;
        Ok(Self::with_parts(config, store, Arc::new(SystemClock)))
    }

    pub fn with_parts(config: &Config, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let (order_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let engine = ProgressionEngine::new(store.clone(), config.timing, order_events_tx.clone());

        Self {
            store,
            engine,
            clock,
            users: UserDirectory::new(),
            jwt: JwtService::new(&config.jwt_secret, config.access_token_ttl_minutes),
            order_events_tx,
            metrics: Metrics::new(),
            sweep_interval_secs: config.sweep_interval_secs,
        }
    }
}
