//! Job store abstractions.
//!
//! A job store is split into two tables: per-type queues holding the job
//! records themselves, and a metadata index keyed by job id. Both sides are
//! traits so the queue service can run on the in-memory backend in tests and
//! on NATS JetStream KV in production.

mod memory;

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

pub use self::memory::{MemoryMetadataStore, MemoryQueueStore};
use crate::Result;
use crate::job::{Job, JobMetadata, JobType};

/// Mutation applied to a stored job.
///
/// Returning `false` leaves the stored job unchanged. The closure may run
/// more than once when the backend retries on contention.
pub type JobMutation<'a> = &'a mut (dyn FnMut(&mut Job) -> bool + Send);

/// Durable per-type priority queues.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts a new job, assigning its queue sequence number.
    async fn insert(&self, job: Job) -> Result<Job>;

    /// Returns a job by type and id.
    async fn get(&self, job_type: JobType, job_id: Uuid) -> Result<Option<Job>>;

    /// Atomically applies `mutation` to a stored job.
    ///
    /// Returns the updated job, or `None` if the job does not exist or the
    /// mutation declined to change it.
    async fn modify(
        &self,
        job_type: JobType,
        job_id: Uuid,
        mutation: JobMutation<'_>,
    ) -> Result<Option<Job>>;

    /// Removes a job, returning it if it existed.
    async fn remove(&self, job_type: JobType, job_id: Uuid) -> Result<Option<Job>>;

    /// Atomically claims the best eligible job of a type.
    ///
    /// The highest priority wins, ties go to the earliest submission. Paused
    /// queues never yield a job.
    async fn claim_next(
        &self,
        job_type: JobType,
        token: Uuid,
        now: Timestamp,
    ) -> Result<Option<Job>>;

    /// Returns every job currently held in a type's queue.
    async fn jobs(&self, job_type: JobType) -> Result<Vec<Job>>;

    /// Sets the paused flag of a type's queue.
    async fn set_paused(&self, job_type: JobType, paused: bool) -> Result<()>;

    /// Returns the paused flag of a type's queue.
    async fn is_paused(&self, job_type: JobType) -> Result<bool>;
}

/// Job metadata index with per-record expiry.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Writes a metadata record.
    async fn put(&self, metadata: &JobMetadata) -> Result<()>;

    /// Returns an unexpired metadata record.
    async fn get(&self, job_id: Uuid) -> Result<Option<JobMetadata>>;

    /// Deletes a metadata record.
    async fn delete(&self, job_id: Uuid) -> Result<()>;

    /// Returns every unexpired metadata record.
    async fn list(&self) -> Result<Vec<JobMetadata>>;
}
