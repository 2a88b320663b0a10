//! olt-pricefeed server entry point.
//!
//! Starts the Axum HTTP server exposing the scheduler-triggered jobs.

use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use olt_pricefeed::api;
use olt_pricefeed::app_state::AppState;
use olt_pricefeed::config::AppConfig;
use olt_pricefeed::persistence::{PgStore, PriceStore};
use olt_pricefeed::service::{MetadataRefresher, PollerEngine, RetentionEnforcer, RunCoordinator};
use olt_pricefeed::te::TeClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, te_base = %config.te_api_base_url, "starting olt-pricefeed");

    // Connect to the store
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store: Arc<dyn PriceStore> = Arc::new(PgStore::new(pool));

    // Build the TE client
    let te = Arc::new(TeClient::new(
        &config.te_api_base_url,
        config.te_api_token.clone(),
        config.te_api_secret.clone(),
        config.max_retries,
    )?);

    // Build the service layer
    let retention = Arc::new(RetentionEnforcer::new(
        store.clone(),
        config.hourly_retention_days_after_end,
    ));
    let poller = Arc::new(PollerEngine::new(
        store.clone(),
        te.clone(),
        RunCoordinator::new(store.clone(), config.stale_lock_minutes),
        RetentionEnforcer::new(store.clone(), config.hourly_retention_days_after_end),
        config.batch_size,
    ));
    let refresher = Arc::new(MetadataRefresher::new(
        store.clone(),
        te,
        config.olt_base_url.clone(),
        config.event_duration_hours,
    ));

    // Build application state
    let app_state = AppState {
        poller,
        refresher,
        retention,
        store,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
