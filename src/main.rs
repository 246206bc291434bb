// Main entry point - Dependency injection, poll loop and read API setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use axum::{routing::get, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::poll_loop::PollLoop;
use crate::application::series_store::SeriesStore;
use crate::infrastructure::actuator_client::ActuatorClient;
use crate::infrastructure::config::load_monitor_config;
use crate::infrastructure::sth_client::TimeseriesClient;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_series, health_check};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_monitor_config()?;

    // Initialize tracing, RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    // Create clients (infrastructure layer)
    let source = Arc::new(TimeseriesClient::new(&config.upstream)?);
    let actuator = Arc::new(ActuatorClient::new(&config.actuator)?);

    // Create store and poll loop (application layer)
    let store = SeriesStore::new(settings.series_cap, settings.zone);
    let state = Arc::new(AppState {
        series: store.reader(),
    });
    let poll_loop = PollLoop::new(source, actuator, store, settings.rules, settings.poll);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(poll_loop.run(shutdown_rx));

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/series", get(get_series))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("Serving series on {}", settings.bind);
    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    poller.await?;
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
}
