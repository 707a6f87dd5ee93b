//! HTTP server for the `stream-mocker serve` command.

mod config;
mod handlers;
mod state;

pub use config::{AutoBandConfig, Config, GeneralConfig, ModelConfig, ResponseConfig, ServerConfig};
pub use handlers::AppError;
pub use state::AppState;

use crate::clock::TokioClock;
use crate::stats::new_shared_stats;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// All routes, with tracing and permissive CORS
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::get_stats))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/{model_id}", get(handlers::get_model))
        .route(
            "/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .route("/config/reload", post(handlers::reload_config))
        .route("/config/{model}", get(handlers::get_model_config))
        .route("/responses", get(handlers::list_responses))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the server until Ctrl+C or SIGTERM.
///
/// `config_path` is remembered so `POST /config/reload` can re-read it.
pub async fn run_server(
    config: Config,
    config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let snapshot = config.to_snapshot()?;

    tracing::info!("Starting Stream Mocker on {}", addr);
    tracing::info!(
        models = snapshot.models().count(),
        default_tokens_per_second = snapshot.default_rate(),
        enforce_time_limit = snapshot.time_limits().enforce,
        max_stream_time_seconds = snapshot.time_limits().max_stream_time_seconds,
        default_response_mode = %snapshot.default_length(),
        "Registry loaded"
    );

    let mut state = AppState::new(snapshot, new_shared_stats(), TokioClock::shared());
    if let Some(path) = config_path {
        state = state.with_config_path(path);
    }

    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
