//! In-process job store backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobMutation, MetadataStore, QueueStore};
use crate::clock::{Clock, add_duration};
use crate::job::{Job, JobMetadata, JobType, next_claimable};
use crate::{Result, TRACING_TARGET_STORE};

#[derive(Debug, Default)]
struct TypeQueue {
    jobs: HashMap<Uuid, Job>,
    next_sequence: u64,
    paused: bool,
}

/// Queue store keeping every queue in process memory.
///
/// All operations on a queue run under one lock, which makes claims and
/// mutations atomic. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    queues: Mutex<HashMap<JobType, TypeQueue>>,
}

impl MemoryQueueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, mut job: Job) -> Result<Job> {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(job.job_type).or_default();

        job.sequence = queue.next_sequence;
        queue.next_sequence += 1;
        queue.jobs.insert(job.id, job.clone());

        tracing::trace!(
            target: TRACING_TARGET_STORE,
            job_id = %job.id,
            job_type = %job.job_type,
            sequence = job.sequence,
            "Inserted job"
        );
        Ok(job)
    }

    async fn get(&self, job_type: JobType, job_id: Uuid) -> Result<Option<Job>> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(&job_type)
            .and_then(|queue| queue.jobs.get(&job_id))
            .cloned())
    }

    async fn modify(
        &self,
        job_type: JobType,
        job_id: Uuid,
        mutation: JobMutation<'_>,
    ) -> Result<Option<Job>> {
        let mut queues = self.queues.lock().await;
        let Some(stored) = queues
            .get_mut(&job_type)
            .and_then(|queue| queue.jobs.get_mut(&job_id))
        else {
            return Ok(None);
        };

        let mut updated = stored.clone();
        if !mutation(&mut updated) {
            return Ok(None);
        }

        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn remove(&self, job_type: JobType, job_id: Uuid) -> Result<Option<Job>> {
        let mut queues = self.queues.lock().await;
        Ok(queues
            .get_mut(&job_type)
            .and_then(|queue| queue.jobs.remove(&job_id)))
    }

    async fn claim_next(
        &self,
        job_type: JobType,
        token: Uuid,
        now: Timestamp,
    ) -> Result<Option<Job>> {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(&job_type) else {
            return Ok(None);
        };
        if queue.paused {
            return Ok(None);
        }

        let Some(job_id) = next_claimable(queue.jobs.values(), now).map(|job| job.id) else {
            return Ok(None);
        };

        let Some(job) = queue.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        job.mark_active(token, now);
        Ok(Some(job.clone()))
    }

    async fn jobs(&self, job_type: JobType) -> Result<Vec<Job>> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(&job_type)
            .map(|queue| queue.jobs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_paused(&self, job_type: JobType, paused: bool) -> Result<()> {
        let mut queues = self.queues.lock().await;
        queues.entry(job_type).or_default().paused = paused;
        Ok(())
    }

    async fn is_paused(&self, job_type: JobType) -> Result<bool> {
        let queues = self.queues.lock().await;
        Ok(queues.get(&job_type).is_some_and(|queue| queue.paused))
    }
}

#[derive(Debug, Clone)]
struct MetadataEntry {
    metadata: JobMetadata,
    expires_at: Timestamp,
}

/// Metadata store keeping records in process memory.
///
/// Expired records are hidden from reads and dropped lazily on writes.
#[derive(Debug)]
pub struct MemoryMetadataStore {
    entries: Mutex<HashMap<Uuid, MetadataEntry>>,
    ttl: Duration,
    clock: Clock,
}

impl MemoryMetadataStore {
    /// Creates an empty store whose records expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Clock::new())
    }

    /// Creates an empty store reading time from `clock`.
    pub fn with_clock(ttl: Duration, clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put(&self, metadata: &JobMetadata) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            metadata.job_id,
            MetadataEntry {
                metadata: metadata.clone(),
                expires_at: add_duration(now, self.ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobMetadata>> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&job_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.metadata.clone()))
    }

    async fn delete(&self, job_id: Uuid) -> Result<()> {
        self.entries.lock().await.remove(&job_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobMetadata>> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        Ok(entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.metadata.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobData, JobPriority, JobStatus};

    fn job(priority: JobPriority) -> Job {
        Job::new(
            JobType::Clustering,
            JobData::new(Uuid::new_v4(), Uuid::new_v4()),
            priority,
            Timestamp::UNIX_EPOCH,
        )
    }

    #[tokio::test]
    async fn test_claim_respects_priority_and_order() {
        let store = MemoryQueueStore::new();
        let first = store.insert(job(JobPriority::Normal)).await.unwrap();
        let second = store.insert(job(JobPriority::Normal)).await.unwrap();
        let urgent = store.insert(job(JobPriority::Critical)).await.unwrap();

        let now = Timestamp::UNIX_EPOCH;
        let token = Uuid::new_v4();
        let order: Vec<Uuid> = [
            store.claim_next(JobType::Clustering, token, now).await.unwrap(),
            store.claim_next(JobType::Clustering, token, now).await.unwrap(),
            store.claim_next(JobType::Clustering, token, now).await.unwrap(),
        ]
        .into_iter()
        .map(|job| job.unwrap().id)
        .collect();

        assert_eq!(order, vec![urgent.id, first.id, second.id]);
        assert!(
            store
                .claim_next(JobType::Clustering, token, now)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_paused_queue_yields_nothing() {
        let store = MemoryQueueStore::new();
        store.insert(job(JobPriority::High)).await.unwrap();
        store.set_paused(JobType::Clustering, true).await.unwrap();

        let claimed = store
            .claim_next(JobType::Clustering, Uuid::new_v4(), Timestamp::UNIX_EPOCH)
            .await
            .unwrap();
        assert!(claimed.is_none());
        assert!(store.is_paused(JobType::Clustering).await.unwrap());
    }

    #[tokio::test]
    async fn test_declined_mutation_keeps_job() {
        let store = MemoryQueueStore::new();
        let inserted = store.insert(job(JobPriority::Low)).await.unwrap();

        let result = store
            .modify(JobType::Clustering, inserted.id, &mut |job: &mut Job| {
                job.status = JobStatus::Failed;
                false
            })
            .await
            .unwrap();
        assert!(result.is_none());

        let stored = store
            .get(JobType::Clustering, inserted.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_expires() {
        let store = MemoryMetadataStore::new(Duration::from_secs(60));
        let job = job(JobPriority::Normal);
        store.put(&JobMetadata::from(&job)).await.unwrap();
        assert!(store.get(job.id).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get(job.id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}
