//! Job queue configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::job::{BackoffPolicy, MAX_ENQUEUE_DELAY};
use crate::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
const DEFAULT_STALL_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_STALLED_COUNT: u32 = 1;
const DEFAULT_METADATA_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_KEEP_COMPLETED: usize = 100;
const DEFAULT_KEEP_FAILED: usize = 50;
const DEFAULT_CLEAN_GRACE_SECS: u64 = 60 * 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_USER_JOBS_LIMIT: usize = 50;

/// Retry, stall and retention settings of the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct QueueConfig {
    /// Attempts made before a job is marked failed.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-max-attempts", env = "QUEUE_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)
    )]
    #[serde(default = "QueueConfig::default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential retry backoff, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-backoff-ms", env = "QUEUE_BACKOFF_MS", default_value_t = DEFAULT_BACKOFF_BASE_MS)
    )]
    #[serde(default = "QueueConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Interval between stall checks, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-stall-interval", env = "QUEUE_STALL_INTERVAL_SECS", default_value_t = DEFAULT_STALL_INTERVAL_SECS)
    )]
    #[serde(default = "QueueConfig::default_stall_interval_secs")]
    pub stall_interval_secs: u64,

    /// Stalls tolerated before a job is marked failed.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-max-stalled", env = "QUEUE_MAX_STALLED_COUNT", default_value_t = DEFAULT_MAX_STALLED_COUNT)
    )]
    #[serde(default = "QueueConfig::default_max_stalled_count")]
    pub max_stalled_count: u32,

    /// Lifetime of job metadata records, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-metadata-ttl", env = "QUEUE_METADATA_TTL_SECS", default_value_t = DEFAULT_METADATA_TTL_SECS)
    )]
    #[serde(default = "QueueConfig::default_metadata_ttl_secs")]
    pub metadata_ttl_secs: u64,

    /// Completed jobs retained per queue.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-keep-completed", env = "QUEUE_KEEP_COMPLETED", default_value_t = DEFAULT_KEEP_COMPLETED)
    )]
    #[serde(default = "QueueConfig::default_keep_completed")]
    pub keep_completed: usize,

    /// Failed jobs retained per queue.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-keep-failed", env = "QUEUE_KEEP_FAILED", default_value_t = DEFAULT_KEEP_FAILED)
    )]
    #[serde(default = "QueueConfig::default_keep_failed")]
    pub keep_failed: usize,

    /// Default grace period of queue cleaning, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "queue-clean-grace", env = "QUEUE_CLEAN_GRACE_SECS", default_value_t = DEFAULT_CLEAN_GRACE_SECS)
    )]
    #[serde(default = "QueueConfig::default_clean_grace_secs")]
    pub clean_grace_secs: u64,

    /// Idle polling interval of workers, in milliseconds.
    #[cfg_attr(
        feature = "config",
        arg(id = "queue_poll_interval_ms", long = "queue-poll-interval-ms", env = "QUEUE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)
    )]
    #[serde(default = "QueueConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            stall_interval_secs: DEFAULT_STALL_INTERVAL_SECS,
            max_stalled_count: DEFAULT_MAX_STALLED_COUNT,
            metadata_ttl_secs: DEFAULT_METADATA_TTL_SECS,
            keep_completed: DEFAULT_KEEP_COMPLETED,
            keep_failed: DEFAULT_KEEP_FAILED,
            clean_grace_secs: DEFAULT_CLEAN_GRACE_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl QueueConfig {
    /// Default number of records returned by user and project listings.
    pub const DEFAULT_LIST_LIMIT: usize = DEFAULT_USER_JOBS_LIMIT;

    /// Longest accepted enqueue delay.
    pub const MAX_DELAY: Duration = MAX_ENQUEUE_DELAY;

    fn default_max_attempts() -> u32 {
        DEFAULT_MAX_ATTEMPTS
    }

    fn default_backoff_base_ms() -> u64 {
        DEFAULT_BACKOFF_BASE_MS
    }

    fn default_stall_interval_secs() -> u64 {
        DEFAULT_STALL_INTERVAL_SECS
    }

    fn default_max_stalled_count() -> u32 {
        DEFAULT_MAX_STALLED_COUNT
    }

    fn default_metadata_ttl_secs() -> u64 {
        DEFAULT_METADATA_TTL_SECS
    }

    fn default_keep_completed() -> usize {
        DEFAULT_KEEP_COMPLETED
    }

    fn default_keep_failed() -> usize {
        DEFAULT_KEEP_FAILED
    }

    fn default_clean_grace_secs() -> u64 {
        DEFAULT_CLEAN_GRACE_SECS
    }

    fn default_poll_interval_ms() -> u64 {
        DEFAULT_POLL_INTERVAL_MS
    }

    /// Set the number of attempts per job.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base backoff delay.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the stall check interval.
    #[must_use]
    pub fn with_stall_interval(mut self, interval: Duration) -> Self {
        self.stall_interval_secs = interval.as_secs();
        self
    }

    /// Set the retention caps for finished jobs.
    #[must_use]
    pub fn with_retention(mut self, keep_completed: usize, keep_failed: usize) -> Self {
        self.keep_completed = keep_completed;
        self.keep_failed = keep_failed;
        self
    }

    /// Returns the retry backoff policy.
    #[inline]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(Duration::from_millis(self.backoff_base_ms))
    }

    /// Returns the stall check interval.
    #[inline]
    pub fn stall_interval(&self) -> Duration {
        Duration::from_secs(self.stall_interval_secs)
    }

    /// Returns the interval at which running jobs refresh their heartbeat.
    #[inline]
    pub fn heartbeat_interval(&self) -> Duration {
        (self.stall_interval() / 3).max(Duration::from_millis(100))
    }

    /// Returns the lifetime of job metadata records.
    #[inline]
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }

    /// Returns the default grace period of [`clean_queue`].
    ///
    /// [`clean_queue`]: crate::queue::JobQueue::clean_queue
    #[inline]
    pub fn clean_grace(&self) -> Duration {
        Duration::from_secs(self.clean_grace_secs)
    }

    /// Returns the idle polling interval of workers.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_config("max attempts must be at least 1"));
        }
        if self.stall_interval_secs == 0 {
            return Err(Error::invalid_config("stall interval must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::invalid_config("poll interval must be positive"));
        }
        Ok(())
    }
}
