//! Job metadata records.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Job, JobData, JobPriority, JobStatus, JobType};

/// Index record kept per job for lookups by id, user or project.
///
/// Written at enqueue time and rewritten once the job finishes, so the
/// final state outlives the queue entry's retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub user_id: Uuid,
    pub project_id: Uuid,
    /// Status at the time the record was written.
    pub status: JobStatus,
    pub priority: JobPriority,
    pub created_at: Timestamp,
    /// Final state, present once the job completed or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
}

/// Final state of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub data: JobData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    pub finished_at: Timestamp,
}

impl JobMetadata {
    /// Builds the record of a job that reached a terminal status.
    ///
    /// Returns `None` while the job can still run.
    pub fn finished(job: &Job) -> Option<Self> {
        if !job.status.is_terminal() {
            return None;
        }

        let outcome = JobOutcome {
            data: job.data.clone(),
            result: job.result.clone(),
            failed_reason: job.failed_reason.clone(),
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            started_at: job.started_at,
            finished_at: job.finished_at.unwrap_or(job.enqueued_at),
        };

        Some(Self {
            status: job.status,
            outcome: Some(outcome),
            ..Self::from(job)
        })
    }
}

impl From<&Job> for JobMetadata {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            user_id: job.data.user_id,
            project_id: job.data.project_id,
            status: JobStatus::Waiting,
            priority: job.priority,
            created_at: job.enqueued_at,
            outcome: None,
        }
    }
}
