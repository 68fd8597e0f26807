//! Job store backend and rollback policy.

use clap::{Args, ValueEnum};
use folio_workflow::workflow::WorkflowStage;
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Backend holding jobs, queue controls and job metadata.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local store, lost on restart.
    #[default]
    Memory,
    /// NATS JetStream key-value buckets.
    Nats,
}

/// Engine wiring options.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Job store backend.
    #[arg(long = "store", env = "JOB_STORE", value_enum, default_value_t = StoreBackend::Memory)]
    pub store: StoreBackend,

    /// Stages a failed workflow rolls back to (comma-separated).
    #[arg(
        long = "rollback-checkpoints",
        env = "ROLLBACK_CHECKPOINTS",
        value_delimiter = ',',
        default_values_t = [WorkflowStage::OcrProcessing, WorkflowStage::Clustering]
    )]
    pub rollback_checkpoints: Vec<WorkflowStage>,

    /// Disables rollback: failed workflows keep the project as is.
    #[arg(long = "no-rollback", env = "NO_ROLLBACK")]
    #[serde(default)]
    pub no_rollback: bool,
}

impl EngineConfig {
    /// Returns the rollback checkpoints, or `None` if rollback is disabled.
    pub fn checkpoints(&self) -> Option<&[WorkflowStage]> {
        (!self.no_rollback).then_some(self.rollback_checkpoints.as_slice())
    }

    /// Validates the checkpoints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(stage) = self
            .rollback_checkpoints
            .iter()
            .find(|stage| stage.job_type().is_none())
        {
            anyhow::bail!("{stage} cannot be a rollback checkpoint, it submits no jobs");
        }
        Ok(())
    }

    /// Logs the engine configuration.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            store = ?self.store,
            rollback_checkpoints = ?self.checkpoints(),
            "Engine configuration"
        );
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            rollback_checkpoints: vec![WorkflowStage::OcrProcessing, WorkflowStage::Clustering],
            no_rollback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_checkpoints_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.checkpoints(),
            Some([WorkflowStage::OcrProcessing, WorkflowStage::Clustering].as_slice())
        );
    }

    #[test]
    fn reject_stage_without_jobs() {
        let config = EngineConfig {
            rollback_checkpoints: vec![WorkflowStage::Upload],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn no_rollback_disables_checkpoints() {
        let config = EngineConfig {
            no_rollback: true,
            ..EngineConfig::default()
        };
        assert!(config.checkpoints().is_none());
    }
}
