//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig          # Host, port, shutdown
//! ├── recovery: RecoveryConfig      # Request timeout
//! ├── engine: EngineConfig          # Job store backend, rollback
//! ├── queue: QueueConfig            # Attempts, backoff, stalls, retention
//! ├── nats: NatsConfig              # NATS connection (store = nats)
//! ├── workflow: OrchestratorConfig  # Polling, timeouts, workflow retention
//! ├── remote: RemoteConfig          # Processor, records and webhook endpoints
//! └── telemetry: TelemetryConfig    # Log format
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! folio --store nats --nats-url nats://localhost:4222 --port 8080
//!
//! # Or via environment variables
//! JOB_STORE=nats NATS_URL=nats://localhost:4222 PORT=8080 folio
//! ```

mod engine;
mod provider;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
use folio_queue::QueueConfig;
use folio_queue::nats::NatsConfig;
use folio_remote::RemoteConfig;
use folio_server::middleware::RecoveryConfig;
use folio_workflow::OrchestratorConfig;

pub use self::engine::{EngineConfig, StoreBackend};
pub use self::provider::{Services, create_services};
pub use self::server::ServerConfig;
use crate::telemetry::TelemetryConfig;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "folio")]
#[command(about = "Folio image-to-document workflow engine")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// HTTP request timeout.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,

    /// Job store backend and rollback policy.
    #[clap(flatten)]
    pub engine: EngineConfig,

    /// Job queue behavior.
    #[clap(flatten)]
    pub queue: QueueConfig,

    /// NATS connection, used with `--store nats`.
    #[clap(flatten)]
    pub nats: NatsConfig,

    /// Workflow orchestration.
    #[clap(flatten)]
    pub workflow: OrchestratorConfig,

    /// Remote collaborators.
    #[clap(flatten)]
    pub remote: RemoteConfig,

    /// Logging.
    #[clap(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so that clap's `env` fallbacks see its values.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.engine
            .validate()
            .context("invalid engine configuration")?;
        self.queue
            .validate()
            .context("invalid queue configuration")?;
        self.workflow
            .validate()
            .context("invalid workflow configuration")?;
        self.remote
            .validate()
            .context("invalid remote configuration")?;

        if self.engine.store == StoreBackend::Nats {
            self.nats.validate().context("invalid NATS configuration")?;
        }

        Ok(())
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();
        self.engine.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            request_timeout_secs = self.recovery.request_timeout,
            max_attempts = self.queue.max_attempts,
            stall_interval_secs = self.queue.stall_interval_secs,
            keep_completed = self.queue.keep_completed,
            keep_failed = self.queue.keep_failed,
            "Queue configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            stage_timeout_secs = self.workflow.stage_timeout_secs,
            upload_timeout_secs = self.workflow.upload_timeout_secs,
            retention_secs = self.workflow.retention_secs,
            "Workflow configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            processor = self.remote.processor_url.as_ref().map(|url| url.as_str()),
            records = self.remote.records_url.as_ref().map(|url| url.as_str()),
            webhook = self.remote.webhook_url.is_some(),
            "Remote collaborators"
        );
    }

    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [
            cfg!(feature = "dotenv").then_some("dotenv"),
            cfg!(feature = "mock").then_some("mock"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
