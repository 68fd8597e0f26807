//! Job queue service: enqueue, query, cancel, pause, clean and stats.
//!
//! [`JobQueue`] owns one queue per [`JobType`] on top of the job store and
//! publishes lifecycle events to subscribers. The orchestrator only needs
//! the narrow [`JobQueueService`] contract, which lets tests substitute a
//! fake queue.

mod event;
mod service;
mod stats;

use async_trait::async_trait;
use uuid::Uuid;

pub use self::event::{JobEvent, JobRef};
pub use self::service::{FailOutcome, JobQueue};
pub use self::stats::{JobView, QueueStats};
use crate::Result;
use crate::job::{Job, JobData, JobOptions, JobType};

/// Job queue operations used to drive workflow stages.
#[async_trait]
pub trait JobQueueService: Send + Sync {
    /// Enqueues a job of the given type.
    async fn add_job(&self, job_type: JobType, data: JobData, options: JobOptions)
    -> Result<Job>;

    /// Returns the merged status view of a job, or `None` if it is gone.
    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobView>>;

    /// Cancels a job that has not finished; returns whether it was cancelled.
    async fn cancel_job(&self, job_id: Uuid) -> Result<bool>;
}
