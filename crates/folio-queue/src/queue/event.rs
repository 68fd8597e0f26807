//! Job lifecycle events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{Job, JobProgress, JobStatus, JobType};

/// Identity of the job an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub user_id: Uuid,
    pub project_id: Uuid,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            user_id: job.data.user_id,
            project_id: job.data.project_id,
        }
    }
}

/// Lifecycle event emitted by the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A worker claimed the job.
    Active { job: JobRef, attempt: u32 },
    /// The running job reported progress.
    Progress { job: JobRef, progress: JobProgress },
    /// The job finished successfully.
    Completed {
        job: JobRef,
        result: serde_json::Value,
    },
    /// An attempt failed; `will_retry` tells whether another attempt follows.
    Failed {
        job: JobRef,
        reason: String,
        attempts_made: u32,
        will_retry: bool,
    },
    /// The job's worker stopped sending heartbeats.
    Stalled { job: JobRef, stalled_count: u32 },
}

impl JobEvent {
    /// Returns the job the event refers to.
    pub fn job(&self) -> &JobRef {
        match self {
            JobEvent::Active { job, .. }
            | JobEvent::Progress { job, .. }
            | JobEvent::Completed { job, .. }
            | JobEvent::Failed { job, .. }
            | JobEvent::Stalled { job, .. } => job,
        }
    }

    /// Returns the job status implied by the event, if it changes it.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobEvent::Active { .. } => Some(JobStatus::Active),
            JobEvent::Completed { .. } => Some(JobStatus::Completed),
            JobEvent::Failed {
                will_retry: true, ..
            } => Some(JobStatus::Delayed),
            JobEvent::Failed { .. } => Some(JobStatus::Failed),
            JobEvent::Stalled { .. } | JobEvent::Progress { .. } => None,
        }
    }
}
