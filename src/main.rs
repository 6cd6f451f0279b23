use std::sync::Arc;

use ride_dispatch::api;
use ride_dispatch::config::{Config, LogFormat};
use ride_dispatch::error::AppError;
use ride_dispatch::state::AppState;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let state = Arc::new(AppState::from_config(&config));
    if config.auth_tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS is empty; every websocket upgrade will be refused");
    }

    let mut resolutions = state.engine.subscribe();
    tokio::spawn(async move {
        loop {
            match resolutions.recv().await {
                Ok(resolution) => tracing::debug!(
                    order_id = resolution.order_id,
                    outcome = resolution.resolution.label(),
                    offers = resolution.offers,
                    "dispatch resolution published"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "resolution listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = api::rest::router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        radius_km = config.dispatch.radius_km,
        offer_timeout_secs = config.dispatch.offer_timeout.as_secs(),
        "http server started"
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
