//! OCPP 1.6-JSON charging station control plane.
//! Reads configuration from TOML file (~/.config/evcsms/config.toml).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use evcsms::api::{build_router, AppState};
use evcsms::charging::{ChargingLifecycleEngine, CommandRouter, Reconciler, StationRegistry, TopUpService};
use evcsms::config::{default_config_path, AppConfig};
use evcsms::infrastructure::bus::InProcessBus;
use evcsms::infrastructure::db::connect_and_migrate;
use evcsms::infrastructure::provider::build_provider;
use evcsms::ocpp::server::OcppServer;
use evcsms::shared::shutdown::ShutdownCoordinator;
use evcsms::SeaOrmRepositoryProvider;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("EVCSMS_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let app_cfg = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.logging.level.clone())),
                )
                .init();
            info!(path = %config_path.display(), "configuration loaded");
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new("info")).init();
            error!(error = %e, "failed to load config, aborting startup");
            return Err(e.into());
        }
    };

    info!("starting EV charging station control plane");

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    info!("Prometheus metrics recorder installed");

    let db = connect_and_migrate(&app_cfg.database.url).await?;
    let repos: Arc<dyn evcsms::domain::RepositoryProvider> = Arc::new(SeaOrmRepositoryProvider::new(db.clone()));

    let bus = Arc::new(InProcessBus::new()) as evcsms::infrastructure::bus::SharedBus;
    let registry = Arc::new(StationRegistry::new(bus.clone()));
    let command_router = Arc::new(CommandRouter::new(bus.clone()));
    let lifecycle = Arc::new(ChargingLifecycleEngine::new(
        repos.clone(),
        registry.clone(),
        command_router.clone(),
        bus.clone(),
        app_cfg.tariff.default_tariff_price_per_kwh,
    ));

    let provider = build_provider(&app_cfg.provider);
    let topups = Arc::new(TopUpService::new(repos.clone(), provider, app_cfg.tariff.default_currency.clone()));

    let reconciler = Arc::new(Reconciler::new(
        repos.clone(),
        command_router.clone(),
        bus.clone(),
        app_cfg.tariff.default_tariff_price_per_kwh,
        app_cfg.heartbeat_tolerance_secs(),
        app_cfg.reconciler.clone(),
    ));

    let shutdown = ShutdownCoordinator::new(app_cfg.server.shutdown_timeout_secs);
    let shutdown_signal = shutdown.signal();
    shutdown.start_signal_listener();

    let ocpp_server = Arc::new(OcppServer::new(
        app_cfg.server.ws_host.clone(),
        app_cfg.server.ws_port,
        Duration::from_secs(app_cfg.ocpp.call_timeout as u64),
        Duration::from_secs(app_cfg.ocpp.heartbeat_interval as u64),
        app_cfg.ocpp.boot_accept,
        app_cfg.ocpp.max_sockets_per_process,
        repos.clone(),
        lifecycle.clone(),
        registry.clone(),
        command_router.clone(),
        shutdown_signal.clone(),
    ));

    let reconciler_shutdown = shutdown_signal.clone();
    let reconciler_task = tokio::spawn(async move { reconciler.run(reconciler_shutdown).await });

    let api_state = AppState { repos, lifecycle, topups, db: db.clone(), prometheus: prometheus_handle };
    let router = build_router(api_state);

    let api_addr = format!("{}:{}", app_cfg.server.api_host, app_cfg.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!(addr = %api_addr, "REST API server listening");

    let api_shutdown = shutdown_signal.clone();
    let api_server = axum::serve(listener, router).with_graceful_shutdown(async move {
        api_shutdown.wait().await;
        info!("REST API server received shutdown signal");
    });

    info!("all servers started, press Ctrl+C to shut down gracefully");

    let ws_task = tokio::spawn(async move { ocpp_server.run().await });
    let api_task = tokio::spawn(async move { api_server.await });

    tokio::select! {
        result = ws_task => match result {
            Ok(Ok(())) => info!("OCPP server stopped"),
            Ok(Err(e)) => error!(error = %e, "OCPP server error"),
            Err(e) => error!(error = %e, "OCPP server task panicked"),
        },
        result = api_task => match result {
            Ok(Ok(())) => info!("REST API server stopped"),
            Ok(Err(e)) => error!(error = %e, "REST API server error"),
            Err(e) => error!(error = %e, "REST API server task panicked"),
        },
    }

    shutdown_signal.trigger();
    if let Err(e) = reconciler_task.await {
        warn!(error = %e, "reconciler task panicked during shutdown");
    }

    if let Err(e) = db.close().await {
        warn!(error = %e, "error closing database connection");
    } else {
        info!("database connection closed");
    }

    info!("shutdown complete");
    Ok(())
}
