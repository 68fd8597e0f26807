//! Job status and progress.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a job.
///
/// Pausing is a property of the queue, not of the job: a job in a paused
/// queue stays `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Eligible for dispatch.
    Waiting,
    /// Scheduled for later, either by an enqueue delay or a retry backoff.
    Delayed,
    /// Claimed by a worker.
    Active,
    /// Finished successfully.
    Completed,
    /// Exhausted its attempts or stalled too often.
    Failed,
}

impl JobStatus {
    /// Returns true if the job will not run again.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns true if the job may still be dispatched.
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(self, JobStatus::Waiting | JobStatus::Delayed)
    }
}

/// Advisory progress reported by a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Completion percentage in `0..=100`.
    pub percentage: u8,
    /// Human-readable description of the current step.
    pub message: String,
    /// Name of the processing step.
    pub stage: String,
    /// Optional processor-specific details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JobProgress {
    /// Creates a progress report, clamping the percentage to 100.
    pub fn new(percentage: u8, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            percentage: percentage.min(100),
            message: message.into(),
            stage: stage.into(),
            data: None,
        }
    }

    /// Attaches processor-specific details.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
