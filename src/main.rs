mod api;
mod config;
mod engine;
mod error;
mod geo;
mod models;
mod observability;
mod state;
mod store;
mod sync;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::store::{MemoryStore, PositionStore};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store: Arc<dyn PositionStore> = Arc::new(MemoryStore::new());
    let shared_state = Arc::new(state::AppState::new(&config, store));

    let app = api::rest::router(shared_state.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sync_task = tokio::spawn(sync::run_store_sync(shared_state.clone(), shutdown_rx));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        drone_id = %config.flight.drone_id,
        base_lat = config.flight.base.lat,
        base_lng = config.flight.base.lng,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    let _ = shutdown_tx.send(());
    if let Err(err) = sync_task.await {
        tracing::error!(error = %err, "store sync task failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
