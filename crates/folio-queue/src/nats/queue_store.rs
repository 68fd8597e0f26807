//! Queue store backed by NATS JetStream KV.

use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kv::{JobKey, JobsBucket, KvStore, KvValue, QueueControlBucket, QueueKey};
use crate::job::{Job, JobType, next_claimable};
use crate::store::{JobMutation, QueueStore};
use crate::{Error, Result, TRACING_TARGET_STORE};

/// Compare-and-set attempts before a mutation gives up.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Persisted control flags of a queue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct QueueControl {
    paused: bool,
}

/// Durable queue store on JetStream KV.
///
/// Every job is one key in the jobs bucket. Claims and mutations are
/// compare-and-set updates on the key revision, so concurrent workers in
/// different processes never claim the same job twice.
///
/// Worker concurrency limits are enforced per process. With several
/// instances consuming the same buckets, a job type may run up to its limit
/// on each instance.
#[derive(Clone)]
pub struct NatsQueueStore {
    jobs: KvStore<JobKey, Job, JobsBucket>,
    control: KvStore<QueueKey, QueueControl, QueueControlBucket>,
}

impl NatsQueueStore {
    pub(crate) async fn open(jetstream: &async_nats::jetstream::Context) -> Result<Self> {
        Ok(Self {
            jobs: KvStore::open(jetstream, Duration::ZERO).await?,
            control: KvStore::open(jetstream, Duration::ZERO).await?,
        })
    }

    async fn entries(&self, job_type: JobType) -> Result<Vec<(JobKey, KvValue<Job>)>> {
        let keys = self.jobs.keys().await?;
        let mut entries = Vec::new();
        for key in keys.into_iter().filter(|key| key.job_type == job_type) {
            if let Some(value) = self.jobs.get(&key).await? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl QueueStore for NatsQueueStore {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id), target = TRACING_TARGET_STORE)]
    async fn insert(&self, mut job: Job) -> Result<Job> {
        // Enqueue time orders equal priorities; the job id breaks ties.
        job.sequence = u64::try_from(job.enqueued_at.as_nanosecond()).unwrap_or_default();
        let key = JobKey::new(job.job_type, job.id);
        self.jobs.create(&key, &job).await?;
        Ok(job)
    }

    async fn get(&self, job_type: JobType, job_id: Uuid) -> Result<Option<Job>> {
        let key = JobKey::new(job_type, job_id);
        Ok(self.jobs.get(&key).await?.map(|entry| entry.value))
    }

    async fn modify(
        &self,
        job_type: JobType,
        job_id: Uuid,
        mutation: JobMutation<'_>,
    ) -> Result<Option<Job>> {
        let key = JobKey::new(job_type, job_id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(KvValue {
                value: mut job,
                revision,
            }) = self.jobs.get(&key).await?
            else {
                return Ok(None);
            };

            if !mutation(&mut job) {
                return Ok(None);
            }

            match self.jobs.update(&key, &job, revision).await {
                Ok(_) => return Ok(Some(job)),
                Err(err) => {
                    tracing::debug!(
                        target: TRACING_TARGET_STORE,
                        key = %key,
                        error = %err,
                        "Revision changed during update, retrying"
                    );
                }
            }
        }

        Err(Error::Contention { job_type, job_id })
    }

    async fn remove(&self, job_type: JobType, job_id: Uuid) -> Result<Option<Job>> {
        let key = JobKey::new(job_type, job_id);
        let existing = self.jobs.get(&key).await?.map(|entry| entry.value);
        if existing.is_some() {
            self.jobs.delete(&key).await?;
        }
        Ok(existing)
    }

    #[tracing::instrument(skip(self), target = TRACING_TARGET_STORE)]
    async fn claim_next(
        &self,
        job_type: JobType,
        token: Uuid,
        now: Timestamp,
    ) -> Result<Option<Job>> {
        if self.is_paused(job_type).await? {
            return Ok(None);
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let entries = self.entries(job_type).await?;
            let next_id = next_claimable(entries.iter().map(|(_, entry)| &entry.value), now)
                .map(|job| job.id);
            let Some((key, KvValue { value, revision })) = next_id.and_then(|job_id| {
                entries
                    .into_iter()
                    .find(|(_, entry)| entry.value.id == job_id)
            }) else {
                return Ok(None);
            };

            let mut job = value;
            job.mark_active(token, now);
            match self.jobs.update(&key, &job, revision).await {
                Ok(_) => return Ok(Some(job)),
                Err(err) => {
                    tracing::debug!(
                        target: TRACING_TARGET_STORE,
                        key = %key,
                        error = %err,
                        "Lost claim race, retrying"
                    );
                }
            }
        }

        Ok(None)
    }

    async fn jobs(&self, job_type: JobType) -> Result<Vec<Job>> {
        Ok(self
            .entries(job_type)
            .await?
            .into_iter()
            .map(|(_, entry)| entry.value)
            .collect())
    }

    async fn set_paused(&self, job_type: JobType, paused: bool) -> Result<()> {
        self.control
            .put(&QueueKey(job_type), &QueueControl { paused })
            .await?;
        Ok(())
    }

    async fn is_paused(&self, job_type: JobType) -> Result<bool> {
        Ok(self
            .control
            .get(&QueueKey(job_type))
            .await?
            .is_some_and(|entry| entry.value.paused))
    }
}
