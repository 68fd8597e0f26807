#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;
mod telemetry;

use std::process;

use anyhow::Context;
use axum::Router;
use folio_server::middleware::{RecoveryConfig, RouterObservabilityExt, RouterRecoveryExt};
use folio_server::{ServiceState, routes};

use crate::config::{Cli, create_services};

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "folio_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "folio_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "folio_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "Application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        let suggestion = error
            .downcast_ref::<server::ServerError>()
            .and_then(server::ServerError::suggestion);
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %format!("{error:#}"),
            suggestion,
            "Application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    telemetry::init_tracing(&cli.telemetry)?;
    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        "Starting folio"
    );

    cli.log();
    cli.validate()?;

    let services = create_services(&cli)
        .await
        .context("failed to start engine services")?;
    let router = create_router(services.state(), &cli.recovery);

    let served = server::serve(router, &cli.server).await;
    services.shutdown(cli.server.shutdown_timeout()).await;
    served?;

    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Observability - request IDs and tracing spans
/// 2. Request logging
/// 3. Recovery - catches panics and enforces timeouts
/// 4. Routes (innermost)
fn create_router(state: ServiceState, recovery: &RecoveryConfig) -> Router {
    routes()
        .with_state(state)
        .with_recovery(recovery)
        .with_request_logging()
        .with_observability()
}
