//! Resource availability API server entry point.

use std::error::Error;
use std::sync::Arc;

use availability_api::config::AppConfig;
use availability_api::routes;
use availability_api::state::AppState;
use availability_api::telemetry::{OtelAmbientContext, init_tracing};
use availability_core::clock::SystemClock;
use availability_outbox::{Dispatcher, LogChannel};
use availability_store::PgDocumentStore;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{Notify, watch};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let tracer_provider = init_tracing(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting resource availability API server");

    // Create database connection pool and make sure the schema exists.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgDocumentStore::new(pool));
    store.ensure_schema().await?;

    // Start the outbox dispatcher.
    let clock = Arc::new(SystemClock);
    let ambient = Arc::new(OtelAmbientContext);
    let trigger = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        Arc::new(LogChannel),
        clock.clone(),
        config.dispatcher_config(),
    ));
    let dispatcher_handle = dispatcher.spawn(trigger.clone(), shutdown_rx, ambient.clone());

    // Build application state and router.
    let app_state = AppState::new(
        clock,
        store,
        config.retry_policy(),
        trigger,
        ambient,
        config.span_context_header.clone(),
    );
    let app = routes::app(app_state).layer(CorsLayer::permissive());

    // Start server.
    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "cannot listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shutting down outbox dispatcher");
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("outbox dispatcher already stopped");
    }
    dispatcher_handle.await?;
    tracer_provider.shutdown()?;

    Ok(())
}
