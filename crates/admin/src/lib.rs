pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use burstguard_common::AppConfig;
use burstguard_detect::BurstGuard;
use tower_http::cors::{Any, CorsLayer};

use crate::state::SharedState;

pub use state::{AppState, GatewayMetrics, SharedState as SharedStateType};

/// Build the Axum router with all admin API routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/metrics", get(routes::metrics::get_metrics))
        .route("/api/config", get(routes::config::get_config))
        .route("/api/stats", get(routes::stats::get_stats))
        .route(
            "/api/allowlist",
            get(routes::allowlist::list_allowlist).post(routes::allowlist::add_to_allowlist),
        )
        .route(
            "/api/allowlist/{client_key}",
            delete(routes::allowlist::remove_from_allowlist),
        )
        .with_state(state)
        .layer(cors)
}

/// Start the admin API server on the specified address.
///
/// Runs until the server fails or the surrounding task is cancelled.
pub async fn run_admin_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "admin API server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Bundle the configuration, engine and metrics into admin state.
pub fn new_shared_state(
    config: AppConfig,
    engine: BurstGuard,
    metrics: Arc<GatewayMetrics>,
) -> SharedState {
    Arc::new(AppState::new(config, engine, metrics))
}
