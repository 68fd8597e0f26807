//! Queue statistics and job views.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{Job, JobData, JobMetadata, JobPriority, JobProgress, JobStatus, JobType};

/// Job counts of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub job_type: JobType,
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    /// Jobs held back because the queue is paused.
    pub paused: usize,
    pub is_paused: bool,
}

impl QueueStats {
    /// Counts `jobs` by status.
    pub(crate) fn collect<'a>(
        job_type: JobType,
        jobs: impl IntoIterator<Item = &'a Job>,
        is_paused: bool,
    ) -> Self {
        let mut stats = Self {
            job_type,
            waiting: 0,
            active: 0,
            completed: 0,
            failed: 0,
            delayed: 0,
            paused: 0,
            is_paused,
        };

        for job in jobs {
            match job.status {
                JobStatus::Waiting if is_paused => stats.paused += 1,
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Delayed => stats.delayed += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        stats
    }

    /// Total number of jobs held in the queue.
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed + self.delayed + self.paused
    }
}

/// Merged view of a job's metadata and live queue state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: JobPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    pub data: JobData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            priority: job.priority,
            progress: job.progress,
            data: job.data,
            result: job.result,
            failed_reason: job.failed_reason,
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            created_at: job.enqueued_at,
            processed_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

impl JobView {
    /// Rebuilds the view of a finished job from its metadata record.
    ///
    /// Returns `None` if the record carries no final state.
    pub fn from_metadata(metadata: JobMetadata) -> Option<Self> {
        let outcome = metadata.outcome?;
        Some(Self {
            id: metadata.job_id,
            job_type: metadata.job_type,
            status: metadata.status,
            priority: metadata.priority,
            progress: None,
            data: outcome.data,
            result: outcome.result,
            failed_reason: outcome.failed_reason,
            attempts_made: outcome.attempts_made,
            max_attempts: outcome.max_attempts,
            created_at: metadata.created_at,
            processed_at: outcome.started_at,
            finished_at: Some(outcome.finished_at),
        })
    }
}
