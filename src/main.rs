use std::sync::Arc;

use planning_router::backend::{InMemoryBackend, PlanningFixtures};
use planning_router::error::AppError;
use planning_router::{api, config, state};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let backend = match &config.seed_file {
        Some(path) => InMemoryBackend::from_fixtures(PlanningFixtures::from_file(path).await?),
        None => InMemoryBackend::new(),
    };

    let app_state = state::AppState::new(Arc::new(backend), &config);
    let app = api::rest::router(Arc::new(app_state));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        operation_timeout_ms = config.operation_timeout.as_millis() as u64,
        "planning server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
