// =============================================================================
// Paper-trading engine — main entry point
// =============================================================================
//
// Starts in paper-trading mode; the kill switch and pause control are both
// readable/writable at runtime via `state/control.record`, so an operator
// can halt new entries without a restart. Exit codes: 0 on a clean Ctrl+C
// shutdown, 2 on an invalid config, 3 on a fatal dependency build failure,
// 130 on a cancelled startup.
// =============================================================================

mod api;
mod config;
mod context;
mod control;
mod domain;
mod driver;
mod errors;
mod gate;
mod health;
mod indicators;
mod journal;
mod markets;
mod observability;
mod observer;
mod paper_engine;
mod portfolio;
mod pricing;
mod rate_limit;
mod selector;
mod snapshot;
mod sources;
mod strategies;
mod strategy_manager;
mod validator;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::context::RuntimeContext;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("paper-trading engine starting up");

    let config_path = std::env::var("AURORA_CONFIG_PATH").ok().map(PathBuf::from);
    let config = match EngineConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration, refusing to start");
            return ExitCode::from(2);
        }
    };

    info!(
        paper_trading_enabled = config.paper_trading_enabled,
        symbols = ?config.symbols,
        scan_interval_seconds = config.scan_interval_seconds,
        "configuration loaded"
    );

    let prometheus_addr = std::env::var("AURORA_METRICS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string());
    match prometheus_addr.parse() {
        Ok(addr) => {
            if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
            {
                warn!(error = %e, "failed to install prometheus exporter, metrics will not be exported");
            } else {
                info!(addr = %prometheus_addr, "prometheus exporter listening");
            }
        }
        Err(e) => warn!(error = %e, addr = %prometheus_addr, "invalid AURORA_METRICS_BIND_ADDR, skipping metrics exporter"),
    }

    let ctx = match RuntimeContext::build(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "failed to build runtime context");
            return ExitCode::from(3);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let driver_ctx = ctx.clone();
    let driver_handle = tokio::spawn(async move {
        driver::run(driver_ctx, shutdown_rx).await;
    });

    let api_ctx = ctx.clone();
    let bind_addr = std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let bind_addr_clone = bind_addr.clone();
    tokio::spawn(async move {
        let app = api::router(api_ctx);
        let listener = match tokio::net::TcpListener::bind(&bind_addr_clone).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %bind_addr_clone, error = %e, "failed to bind api server");
                return;
            }
        };
        info!(addr = %bind_addr_clone, "api server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "api server failed");
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to install ctrl-c handler");
            }
            warn!("shutdown signal received, stopping gracefully");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = driver_handle.await {
        error!(error = %e, "driver loop task panicked during shutdown");
    }

    info!("paper-trading engine shut down complete");
    ExitCode::SUCCESS
}
