//! Cultura AI gateway. Config: `config/cultura.toml` or `CULTURA_CONFIG`,
//! overridden by `CULTURA_*` env vars; `.env` is loaded first.

use cultura_core::AiConfig;
use cultura_gateway::{build_orchestrator, model_from_config, router, AppState, BoxError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AiConfig::load()?;
    let model = model_from_config(&config);
    let orchestrator = Arc::new(build_orchestrator(&config, model).await?);

    let shutdown = CancellationToken::new();
    let sweeper = config.sessions.sweep_interval().map(|interval| {
        tracing::info!(target: "cultura::gateway", interval_secs = interval.as_secs(), "session sweeper started");
        orchestrator.sessions().spawn_sweeper(interval, shutdown.clone())
    });

    let state = Arc::new(AppState {
        orchestrator,
        request_timeout: config.gateway.request_timeout(),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.gateway.bind_addr).await?;
    tracing::info!(
        target: "cultura::gateway",
        addr = %config.gateway.bind_addr,
        version = cultura_core::version(),
        "listening"
    );

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "cultura::gateway", error = %e, "failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        handle.await.ok();
    }
    tracing::info!(target: "cultura::gateway", "shut down");
    Ok(())
}
