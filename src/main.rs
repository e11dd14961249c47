use std::sync::Arc;

use drone_delivery::api;
use drone_delivery::config::Config;
use drone_delivery::engine::scheduler::run_sweep_scheduler;
use drone_delivery::error::AppError;
use drone_delivery::state::AppState;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    if config.uses_development_secret() {
        tracing::warn!("JWT_SECRET not set, using development secret");
    }

    let shared_state = Arc::new(AppState::new(&config).await?);
    let shutdown = CancellationToken::new();

    let app = api::rest::router(shared_state.clone());

    let scheduler = tokio::spawn(run_sweep_scheduler(
        shared_state.clone(),
        shutdown.clone(),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")));

    shutdown.cancel();
    if let Err(err) = scheduler.await {
        tracing::error!(error = %err, "sweep scheduler task failed");
    }

    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
