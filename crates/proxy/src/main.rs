mod context;
mod service;
mod upstream;

use std::sync::Arc;

use anyhow::Result;
use burstguard_admin::{GatewayMetrics, SharedStateType};
use burstguard_common::AppConfig;
use burstguard_detect::BurstGuard;
use pingora_core::server::Server;
use pingora_proxy::http_proxy_service;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::service::BurstGuardProxy;
use crate::upstream::UpstreamSelector;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/burstguard.yaml".to_string());

    info!(config_path = %config_path, "starting burst guard gateway");

    let app_config = AppConfig::load(&config_path)?;

    let engine = BurstGuard::new(app_config.detection.clone());
    let _janitor = engine.start_janitor()?;
    let metrics = Arc::new(GatewayMetrics::new()?);

    let mut server = Server::new(None)?;
    server.bootstrap();

    let proxy = BurstGuardProxy::new(
        engine.clone(),
        UpstreamSelector::from_config(&app_config.upstream),
        metrics.clone(),
    );
    let mut proxy_service = http_proxy_service(&server.configuration, proxy);

    for listen_addr in &app_config.server.listen {
        info!(addr = %listen_addr, "adding listener");
        proxy_service.add_tcp(listen_addr);
    }

    server.add_service(proxy_service);

    if app_config.server.admin.enabled {
        let listen_addr = app_config.server.admin.listen.clone();
        let state = burstguard_admin::new_shared_state(app_config, engine, metrics);
        server.add_service(pingora_core::services::background::background_service(
            "admin API",
            AdminBackgroundService { listen_addr, state },
        ));
    }

    info!("burst guard gateway started");
    server.run_forever();
}

/// Runs the admin API alongside Pingora.
struct AdminBackgroundService {
    listen_addr: String,
    state: SharedStateType,
}

#[async_trait::async_trait]
impl pingora_core::services::background::BackgroundService for AdminBackgroundService {
    async fn start(&self, mut shutdown: pingora_core::server::ShutdownWatch) {
        info!(addr = %self.listen_addr, "starting admin API");

        tokio::select! {
            result = burstguard_admin::run_admin_server(self.state.clone(), &self.listen_addr) => {
                if let Err(e) = result {
                    error!(error = %e, "admin API server error");
                }
            }
            _ = shutdown.changed() => {
                info!("admin API shutting down");
            }
        }
    }
}
