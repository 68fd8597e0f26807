//! Orchestrator configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_UPLOAD_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_RETENTION_SECS: u64 = 5 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Polling, timeout and retention settings of the workflow orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct OrchestratorConfig {
    /// Interval between job status checks of a running stage, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(id = "workflow_poll_interval_ms", long = "workflow-poll-interval-ms", env = "WORKFLOW_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)
    )]
    #[serde(default = "OrchestratorConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Interval between upload checks, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "workflow-upload-poll-interval-ms", env = "WORKFLOW_UPLOAD_POLL_INTERVAL_MS", default_value_t = DEFAULT_UPLOAD_POLL_INTERVAL_MS)
    )]
    #[serde(default = "OrchestratorConfig::default_upload_poll_interval_ms")]
    pub upload_poll_interval_ms: u64,

    /// Longest wait for pending uploads, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "workflow-upload-timeout", env = "WORKFLOW_UPLOAD_TIMEOUT_SECS", default_value_t = DEFAULT_UPLOAD_TIMEOUT_SECS)
    )]
    #[serde(default = "OrchestratorConfig::default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Longest wait for the jobs of one processing stage, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "workflow-stage-timeout", env = "WORKFLOW_STAGE_TIMEOUT_SECS", default_value_t = DEFAULT_STAGE_TIMEOUT_SECS)
    )]
    #[serde(default = "OrchestratorConfig::default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Time finished workflows stay queryable, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "workflow-retention", env = "WORKFLOW_RETENTION_SECS", default_value_t = DEFAULT_RETENTION_SECS)
    )]
    #[serde(default = "OrchestratorConfig::default_retention_secs")]
    pub retention_secs: u64,

    /// Interval between registry sweeps, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "workflow-sweep-interval", env = "WORKFLOW_SWEEP_INTERVAL_SECS", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)
    )]
    #[serde(default = "OrchestratorConfig::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            upload_poll_interval_ms: DEFAULT_UPLOAD_POLL_INTERVAL_MS,
            upload_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl OrchestratorConfig {
    fn default_poll_interval_ms() -> u64 {
        DEFAULT_POLL_INTERVAL_MS
    }

    fn default_upload_poll_interval_ms() -> u64 {
        DEFAULT_UPLOAD_POLL_INTERVAL_MS
    }

    fn default_upload_timeout_secs() -> u64 {
        DEFAULT_UPLOAD_TIMEOUT_SECS
    }

    fn default_stage_timeout_secs() -> u64 {
        DEFAULT_STAGE_TIMEOUT_SECS
    }

    fn default_retention_secs() -> u64 {
        DEFAULT_RETENTION_SECS
    }

    fn default_sweep_interval_secs() -> u64 {
        DEFAULT_SWEEP_INTERVAL_SECS
    }

    /// Sets the stage poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_millis(interval);
        self
    }

    /// Sets the processing stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the upload wait timeout.
    #[must_use]
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets how long finished workflows stay queryable.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_secs = retention.as_secs();
        self
    }

    /// Returns the stage poll interval.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the upload poll interval.
    #[inline]
    pub fn upload_poll_interval(&self) -> Duration {
        Duration::from_millis(self.upload_poll_interval_ms)
    }

    /// Returns the upload wait timeout.
    #[inline]
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Returns the processing stage timeout.
    #[inline]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Returns how long finished workflows stay queryable.
    #[inline]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Returns the registry sweep interval.
    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.upload_poll_interval_ms == 0 {
            return Err(Error::invalid_config("poll intervals must be positive"));
        }
        if self.stage_timeout_secs == 0 || self.upload_timeout_secs == 0 {
            return Err(Error::invalid_config("stage timeouts must be positive"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::invalid_config("sweep interval must be positive"));
        }
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.upload_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.upload_timeout(), Duration::from_secs(300));
        assert_eq!(config.stage_timeout(), Duration::from_secs(1800));
        assert_eq!(config.retention(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let config = OrchestratorConfig::default().with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"stage_timeout_secs": 60}"#).unwrap();
        assert_eq!(config.stage_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }
}
