//! Job queue service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use super::{JobEvent, JobQueueService, JobRef, JobView, QueueStats};
use crate::clock::{Clock, add_duration, sub_duration};
use crate::job::{Job, JobData, JobMetadata, JobOptions, JobProgress, JobStatus, JobType};
use crate::store::{MemoryMetadataStore, MemoryQueueStore, MetadataStore, QueueStore};
use crate::{QueueConfig, Result, TRACING_TARGET_QUEUE};

/// Capacity of the lifecycle event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Reason recorded on jobs that stalled more often than allowed.
const STALLED_REASON: &str = "job stalled more than the allowable limit";

/// Outcome of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// The job was rescheduled after a backoff delay.
    Retrying { delay: Duration },
    /// The job exhausted its attempts.
    Failed,
    /// The claim no longer owned the job; the report was discarded.
    Discarded,
}

/// Owns one queue per job type on top of a [`QueueStore`] and a
/// [`MetadataStore`].
///
/// Cheaply cloneable; clones share stores, configuration and the event
/// channel.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<JobQueueInner>,
}

struct JobQueueInner {
    store: Arc<dyn QueueStore>,
    metadata: Arc<dyn MetadataStore>,
    config: QueueConfig,
    clock: Clock,
    events: broadcast::Sender<JobEvent>,
    wakers: HashMap<JobType, Arc<Notify>>,
}

impl JobQueue {
    /// Creates a queue service over the given stores.
    pub fn new(
        store: Arc<dyn QueueStore>,
        metadata: Arc<dyn MetadataStore>,
        config: QueueConfig,
    ) -> Self {
        Self::with_clock(store, metadata, config, Clock::new())
    }

    /// Creates a queue service reading time from `clock`.
    pub fn with_clock(
        store: Arc<dyn QueueStore>,
        metadata: Arc<dyn MetadataStore>,
        config: QueueConfig,
        clock: Clock,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let wakers = JobType::all()
            .map(|job_type| (job_type, Arc::new(Notify::new())))
            .collect();

        Self {
            inner: Arc::new(JobQueueInner {
                store,
                metadata,
                config,
                clock,
                events,
                wakers,
            }),
        }
    }

    /// Creates a queue service on the in-memory store backends.
    pub fn in_memory(config: QueueConfig) -> Self {
        let clock = Clock::new();
        let metadata = MemoryMetadataStore::with_clock(config.metadata_ttl(), clock);
        Self::with_clock(
            Arc::new(MemoryQueueStore::new()),
            Arc::new(metadata),
            config,
            clock,
        )
    }

    /// Returns the queue configuration.
    #[inline]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Returns the clock the queue reads time from.
    #[inline]
    pub fn clock(&self) -> Clock {
        self.inner.clock
    }

    /// Subscribes to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the notifier woken when a type's queue may have claimable jobs.
    pub(crate) fn waker(&self, job_type: JobType) -> Arc<Notify> {
        self.inner
            .wakers
            .get(&job_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(Notify::new()))
    }

    fn wake(&self, job_type: JobType) {
        if let Some(waker) = self.inner.wakers.get(&job_type) {
            waker.notify_one();
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }
}

// Client-facing operations.
impl JobQueue {
    /// Enqueues a job and records its metadata.
    ///
    /// The job starts `Waiting`, or `Delayed` when a positive delay is given.
    /// Delays are clamped to five minutes. The payload's `created_at` is
    /// stamped from the queue clock.
    #[tracing::instrument(skip(self, data, options), fields(job_id = %data.job_id), target = TRACING_TARGET_QUEUE)]
    pub async fn add_job(
        &self,
        job_type: JobType,
        mut data: JobData,
        options: JobOptions,
    ) -> Result<Job> {
        let now = self.now();
        data.created_at = now;
        let config = &self.inner.config;
        let mut job = Job::new(job_type, data, options.priority(), now)
            .with_retry(config.max_attempts, config.backoff());

        let delay = options.delay();
        if !delay.is_zero() {
            job = job.delayed_until(add_duration(now, delay));
        }

        let job = self.inner.store.insert(job).await?;
        if let Err(err) = self.inner.metadata.put(&JobMetadata::from(&job)).await {
            let _ = self.inner.store.remove(job_type, job.id).await;
            return Err(err);
        }

        tracing::info!(
            target: TRACING_TARGET_QUEUE,
            job_id = %job.id,
            job_type = %job_type,
            priority = %job.priority,
            delay_ms = delay.as_millis(),
            "Job enqueued"
        );

        self.wake(job_type);
        Ok(job)
    }

    /// Returns the merged metadata and live state of a job.
    ///
    /// A finished job evicted from its queue is answered from the final
    /// state kept in its metadata. Returns `None` when the metadata record
    /// is gone, or when the queue entry is gone before the job finished.
    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobView>> {
        let Some(metadata) = self.inner.metadata.get(job_id).await? else {
            return Ok(None);
        };

        match self.inner.store.get(metadata.job_type, job_id).await? {
            Some(job) => Ok(Some(JobView::from(job))),
            None => Ok(JobView::from_metadata(metadata)),
        }
    }

    /// Removes a job that has not finished yet and deletes its metadata.
    ///
    /// Returns `true` only if a job was actually cancelled. A job that is
    /// already running keeps running, but its result is discarded.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool> {
        let Some(metadata) = self.inner.metadata.get(job_id).await? else {
            return Ok(false);
        };

        let job_type = metadata.job_type;
        let Some(job) = self.inner.store.get(job_type, job_id).await? else {
            if !metadata.status.is_terminal() {
                self.inner.metadata.delete(job_id).await?;
            }
            return Ok(false);
        };

        if job.status.is_terminal() {
            return Ok(false);
        }

        self.inner.store.remove(job_type, job_id).await?;
        self.inner.metadata.delete(job_id).await?;

        tracing::info!(
            target: TRACING_TARGET_QUEUE,
            job_id = %job_id,
            job_type = %job_type,
            status = %job.status,
            "Job cancelled"
        );
        Ok(true)
    }

    /// Returns the job counts of one queue.
    pub async fn get_queue_stats(&self, job_type: JobType) -> Result<QueueStats> {
        let jobs = self.inner.store.jobs(job_type).await?;
        let is_paused = self.inner.store.is_paused(job_type).await?;
        Ok(QueueStats::collect(job_type, &jobs, is_paused))
    }

    /// Returns the job counts of every queue.
    pub async fn get_all_queue_stats(&self) -> Result<Vec<QueueStats>> {
        let mut stats = Vec::new();
        for job_type in JobType::all() {
            stats.push(self.get_queue_stats(job_type).await?);
        }
        Ok(stats)
    }

    /// Returns the newest metadata records of a user's jobs.
    pub async fn get_user_jobs(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<JobMetadata>> {
        self.list_metadata(|metadata| metadata.user_id == user_id, limit)
            .await
    }

    /// Returns the newest metadata records of a project's jobs.
    pub async fn get_project_jobs(
        &self,
        project_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<JobMetadata>> {
        self.list_metadata(|metadata| metadata.project_id == project_id, limit)
            .await
    }

    async fn list_metadata(
        &self,
        filter: impl Fn(&JobMetadata) -> bool,
        limit: Option<usize>,
    ) -> Result<Vec<JobMetadata>> {
        let limit = limit.unwrap_or(QueueConfig::DEFAULT_LIST_LIMIT);
        let mut records: Vec<_> = self
            .inner
            .metadata
            .list()
            .await?
            .into_iter()
            .filter(|metadata| filter(metadata))
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    /// Stops dispatching jobs of a type. Enqueues are still accepted.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub async fn pause_queue(&self, job_type: JobType) -> Result<()> {
        self.inner.store.set_paused(job_type, true).await?;
        tracing::info!(target: TRACING_TARGET_QUEUE, job_type = %job_type, "Queue paused");
        Ok(())
    }

    /// Resumes dispatching jobs of a type.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub async fn resume_queue(&self, job_type: JobType) -> Result<()> {
        self.inner.store.set_paused(job_type, false).await?;
        tracing::info!(target: TRACING_TARGET_QUEUE, job_type = %job_type, "Queue resumed");
        self.wake(job_type);
        Ok(())
    }

    /// Removes finished jobs that finished more than `grace` ago.
    ///
    /// Defaults to the configured grace period. Returns the number of jobs
    /// removed.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub async fn clean_queue(&self, job_type: JobType, grace: Option<Duration>) -> Result<usize> {
        let grace = grace.unwrap_or_else(|| self.inner.config.clean_grace());
        let cutoff = sub_duration(self.now(), grace);

        let mut removed = 0;
        for job in self.inner.store.jobs(job_type).await? {
            let expired = job.status.is_terminal()
                && job.finished_at.is_some_and(|finished| finished < cutoff);
            if expired && self.inner.store.remove(job_type, job.id).await?.is_some() {
                removed += 1;
            }
        }

        tracing::info!(
            target: TRACING_TARGET_QUEUE,
            job_type = %job_type,
            removed,
            grace_secs = grace.as_secs(),
            "Queue cleaned"
        );
        Ok(removed)
    }
}

// Worker-facing operations.
impl JobQueue {
    /// Claims the next eligible job of a type for a new execution.
    pub async fn claim_next(&self, job_type: JobType) -> Result<Option<Job>> {
        let token = Uuid::new_v4();
        let claimed = self
            .inner
            .store
            .claim_next(job_type, token, self.now())
            .await?;

        if let Some(job) = &claimed {
            tracing::debug!(
                target: TRACING_TARGET_QUEUE,
                job_id = %job.id,
                job_type = %job_type,
                attempt = job.attempts_made,
                "Job claimed"
            );
            self.emit(JobEvent::Active {
                job: JobRef::from(job),
                attempt: job.attempts_made,
            });
        }

        Ok(claimed)
    }

    /// Refreshes the heartbeat of a claimed job.
    ///
    /// Returns `false` if the claim no longer owns the job.
    pub async fn heartbeat(&self, job: &Job) -> Result<bool> {
        let Some(token) = job.claim_token else {
            return Ok(false);
        };

        let now = self.now();
        let updated = self
            .inner
            .store
            .modify(job.job_type, job.id, &mut |stored: &mut Job| {
                if !stored.is_claimed_by(token) {
                    return false;
                }
                stored.heartbeat_at = Some(now);
                true
            })
            .await?;

        Ok(updated.is_some())
    }

    /// Records the latest progress of a claimed job.
    ///
    /// Returns `false` if the claim no longer owns the job.
    pub async fn report_progress(&self, job: &Job, progress: JobProgress) -> Result<bool> {
        let Some(token) = job.claim_token else {
            return Ok(false);
        };

        let now = self.now();
        let updated = self
            .inner
            .store
            .modify(job.job_type, job.id, &mut |stored: &mut Job| {
                if !stored.is_claimed_by(token) {
                    return false;
                }
                stored.progress = Some(progress.clone());
                stored.heartbeat_at = Some(now);
                true
            })
            .await?;

        if updated.is_some() {
            self.emit(JobEvent::Progress {
                job: JobRef::from(job),
                progress,
            });
        }

        Ok(updated.is_some())
    }

    /// Marks a claimed job completed with its result.
    ///
    /// Returns `false` if the claim no longer owns the job, e.g. because it
    /// was cancelled or recovered after a stall.
    #[tracing::instrument(skip(self, job, result), fields(job_id = %job.id), target = TRACING_TARGET_QUEUE)]
    pub async fn complete(&self, job: &Job, result: serde_json::Value) -> Result<bool> {
        let Some(token) = job.claim_token else {
            return Ok(false);
        };

        let now = self.now();
        let updated = self
            .inner
            .store
            .modify(job.job_type, job.id, &mut |stored: &mut Job| {
                if !stored.is_claimed_by(token) {
                    return false;
                }
                stored.status = JobStatus::Completed;
                stored.result = Some(result.clone());
                stored.failed_reason = None;
                stored.finished_at = Some(now);
                stored.claim_token = None;
                true
            })
            .await?;

        let Some(updated) = updated else {
            tracing::warn!(
                target: TRACING_TARGET_QUEUE,
                job_id = %job.id,
                job_type = %job.job_type,
                "Discarding result of job no longer owned by this execution"
            );
            return Ok(false);
        };

        tracing::info!(
            target: TRACING_TARGET_QUEUE,
            job_id = %job.id,
            job_type = %job.job_type,
            "Job completed"
        );
        self.emit(JobEvent::Completed {
            job: JobRef::from(job),
            result,
        });

        self.record_outcome(&updated).await;
        self.enforce_retention(job.job_type).await?;
        Ok(true)
    }

    /// Records a failed attempt of a claimed job.
    ///
    /// Reschedules the job with backoff while attempts remain, otherwise
    /// marks it failed with `reason`.
    #[tracing::instrument(skip(self, job, reason), fields(job_id = %job.id), target = TRACING_TARGET_QUEUE)]
    pub async fn fail(&self, job: &Job, reason: impl Into<String>) -> Result<FailOutcome> {
        let Some(token) = job.claim_token else {
            return Ok(FailOutcome::Discarded);
        };

        let reason = reason.into();
        let now = self.now();
        let mut outcome = FailOutcome::Discarded;
        let updated = self
            .inner
            .store
            .modify(job.job_type, job.id, &mut |stored: &mut Job| {
                if !stored.is_claimed_by(token) {
                    return false;
                }
                stored.failed_reason = Some(reason.clone());
                stored.claim_token = None;

                if stored.can_retry() {
                    let delay = stored.backoff.delay_for(stored.attempts_made);
                    stored.status = JobStatus::Delayed;
                    stored.available_at = add_duration(now, delay);
                    outcome = FailOutcome::Retrying { delay };
                } else {
                    stored.status = JobStatus::Failed;
                    stored.finished_at = Some(now);
                    outcome = FailOutcome::Failed;
                }
                true
            })
            .await?;

        let Some(updated) = updated else {
            tracing::warn!(
                target: TRACING_TARGET_QUEUE,
                job_id = %job.id,
                job_type = %job.job_type,
                "Discarding failure of job no longer owned by this execution"
            );
            return Ok(FailOutcome::Discarded);
        };

        let will_retry = matches!(outcome, FailOutcome::Retrying { .. });
        tracing::warn!(
            target: TRACING_TARGET_QUEUE,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = updated.attempts_made,
            max_attempts = updated.max_attempts,
            will_retry,
            reason = %reason,
            "Job attempt failed"
        );
        self.emit(JobEvent::Failed {
            job: JobRef::from(&updated),
            reason,
            attempts_made: updated.attempts_made,
            will_retry,
        });

        if !will_retry {
            self.record_outcome(&updated).await;
            self.enforce_retention(job.job_type).await?;
        }
        Ok(outcome)
    }

    /// Recovers active jobs of a type whose heartbeat is older than the
    /// stall interval.
    ///
    /// A stalled job is requeued while it has stalls and attempts left,
    /// otherwise it is marked failed. Returns the number of stalled jobs.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub async fn check_stalled(&self, job_type: JobType) -> Result<usize> {
        let config = &self.inner.config;
        let now = self.now();
        let cutoff = sub_duration(now, config.stall_interval());
        let max_stalled = config.max_stalled_count;

        let mut stalled = 0;
        for job in self.inner.store.jobs(job_type).await? {
            let is_stale = job.status == JobStatus::Active
                && job.heartbeat_at.is_none_or(|beat| beat < cutoff);
            if !is_stale {
                continue;
            }

            let token = job.claim_token;
            let updated = self
                .inner
                .store
                .modify(job_type, job.id, &mut |stored: &mut Job| {
                    if stored.status != JobStatus::Active || stored.claim_token != token {
                        return false;
                    }
                    stored.stalled_count += 1;
                    stored.claim_token = None;

                    if stored.stalled_count > max_stalled || !stored.can_retry() {
                        stored.status = JobStatus::Failed;
                        stored.failed_reason = Some(STALLED_REASON.to_string());
                        stored.finished_at = Some(now);
                    } else {
                        stored.status = JobStatus::Waiting;
                        stored.available_at = now;
                    }
                    true
                })
                .await?;

            let Some(updated) = updated else {
                continue;
            };

            stalled += 1;
            tracing::warn!(
                target: TRACING_TARGET_QUEUE,
                job_id = %updated.id,
                job_type = %job_type,
                stalled_count = updated.stalled_count,
                status = %updated.status,
                "Job stalled"
            );

            let job_ref = JobRef::from(&updated);
            self.emit(JobEvent::Stalled {
                job: job_ref,
                stalled_count: updated.stalled_count,
            });
            if updated.status == JobStatus::Failed {
                self.record_outcome(&updated).await;
                self.emit(JobEvent::Failed {
                    job: job_ref,
                    reason: STALLED_REASON.to_string(),
                    attempts_made: updated.attempts_made,
                    will_retry: false,
                });
            }
        }

        if stalled > 0 {
            self.wake(job_type);
            self.enforce_retention(job_type).await?;
        }
        Ok(stalled)
    }

    /// Rewrites the metadata record of a finished job with its final state.
    ///
    /// A record that was deleted by a cancellation stays deleted.
    async fn record_outcome(&self, job: &Job) {
        let Some(finished) = JobMetadata::finished(job) else {
            return;
        };

        let written = match self.inner.metadata.get(job.id).await {
            Ok(Some(_)) => self.inner.metadata.put(&finished).await,
            Ok(None) => return,
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            tracing::warn!(
                target: TRACING_TARGET_QUEUE,
                job_id = %job.id,
                job_type = %job.job_type,
                error = %err,
                "Failed to record job outcome"
            );
        }
    }

    /// Drops the oldest finished jobs beyond the retention caps.
    async fn enforce_retention(&self, job_type: JobType) -> Result<()> {
        let config = &self.inner.config;
        let jobs = self.inner.store.jobs(job_type).await?;

        for (status, keep) in [
            (JobStatus::Completed, config.keep_completed),
            (JobStatus::Failed, config.keep_failed),
        ] {
            let mut finished: Vec<&Job> = jobs.iter().filter(|job| job.status == status).collect();
            if finished.len() <= keep {
                continue;
            }

            finished.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
            for job in finished.into_iter().skip(keep) {
                self.inner.store.remove(job_type, job.id).await?;
                tracing::trace!(
                    target: TRACING_TARGET_QUEUE,
                    job_id = %job.id,
                    status = %status,
                    "Evicted finished job"
                );
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl JobQueueService for JobQueue {
    async fn add_job(
        &self,
        job_type: JobType,
        data: JobData,
        options: JobOptions,
    ) -> Result<Job> {
        JobQueue::add_job(self, job_type, data, options).await
    }

    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobView>> {
        JobQueue::get_job_status(self, job_id).await
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<bool> {
        JobQueue::cancel_job(self, job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobPriority;

    fn queue() -> JobQueue {
        JobQueue::in_memory(QueueConfig::default())
    }

    fn data() -> JobData {
        JobData::new(Uuid::new_v4(), Uuid::new_v4()).with_field("note_id", "n-1")
    }

    #[tokio::test]
    async fn test_add_then_status_preserves_payload() {
        let queue = queue();
        let data = data();
        let job = queue
            .add_job(JobType::TextCleaning, data.clone(), JobOptions::default())
            .await
            .unwrap();

        let view = queue.get_job_status(job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Waiting);
        assert_eq!(view.priority, JobPriority::Normal);
        assert_eq!(
            serde_json::to_vec(&view.data).unwrap(),
            serde_json::to_vec(&data).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_job_has_no_status() {
        let queue = queue();
        assert!(queue.get_job_status(Uuid::new_v4()).await.unwrap().is_none());
        assert!(!queue.cancel_job(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_waiting_job() {
        let queue = queue();
        let job = queue
            .add_job(JobType::OcrProcessing, data(), JobOptions::default())
            .await
            .unwrap();

        assert!(queue.cancel_job(job.id).await.unwrap());
        assert!(queue.get_job_status(job.id).await.unwrap().is_none());
        assert!(!queue.cancel_job(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_completed_job_is_rejected() {
        let queue = queue();
        let job = queue
            .add_job(JobType::OcrProcessing, data(), JobOptions::default())
            .await
            .unwrap();
        let claimed = queue
            .claim_next(JobType::OcrProcessing)
            .await
            .unwrap()
            .unwrap();
        assert!(queue.complete(&claimed, serde_json::json!({"text": "hi"})).await.unwrap());

        assert!(!queue.cancel_job(job.id).await.unwrap());
        let view = queue.get_job_status(job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.result, Some(serde_json::json!({"text": "hi"})));
    }

    #[tokio::test]
    async fn test_cancelled_active_job_discards_result() {
        let queue = queue();
        let job = queue
            .add_job(JobType::Clustering, data(), JobOptions::default())
            .await
            .unwrap();
        let claimed = queue.claim_next(JobType::Clustering).await.unwrap().unwrap();

        assert!(queue.cancel_job(job.id).await.unwrap());
        assert!(!queue.complete(&claimed, serde_json::json!({})).await.unwrap());
        assert_eq!(
            queue.fail(&claimed, "late").await.unwrap(),
            FailOutcome::Discarded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_failure() {
        let queue = queue();
        let job = queue
            .add_job(JobType::Clustering, data(), JobOptions::default())
            .await
            .unwrap();

        let first = queue.claim_next(JobType::Clustering).await.unwrap().unwrap();
        assert_eq!(
            queue.fail(&first, "boom").await.unwrap(),
            FailOutcome::Retrying {
                delay: Duration::from_secs(2)
            }
        );
        assert!(queue.claim_next(JobType::Clustering).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(2)).await;
        let second = queue.claim_next(JobType::Clustering).await.unwrap().unwrap();
        assert_eq!(
            queue.fail(&second, "boom").await.unwrap(),
            FailOutcome::Retrying {
                delay: Duration::from_secs(4)
            }
        );

        tokio::time::advance(Duration::from_secs(4)).await;
        let third = queue.claim_next(JobType::Clustering).await.unwrap().unwrap();
        assert_eq!(queue.fail(&third, "boom").await.unwrap(), FailOutcome::Failed);

        let view = queue.get_job_status(job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.attempts_made, 3);
        assert_eq!(view.failed_reason.as_deref(), Some("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_becomes_claimable() {
        let queue = queue();
        let job = queue
            .add_job(
                JobType::ExportGeneration,
                data(),
                JobOptions::default().with_delay(Duration::from_secs(10)),
            )
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Delayed);
        assert!(queue.claim_next(JobType::ExportGeneration).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        let claimed = queue.claim_next(JobType::ExportGeneration).await.unwrap();
        assert_eq!(claimed.map(|job| job.id), Some(job.id));
    }

    #[tokio::test]
    async fn test_paused_queue_keeps_jobs_waiting() {
        let queue = queue();
        queue.pause_queue(JobType::Clustering).await.unwrap();
        let job = queue
            .add_job(JobType::Clustering, data(), JobOptions::default())
            .await
            .unwrap();

        assert!(queue.claim_next(JobType::Clustering).await.unwrap().is_none());
        let stats = queue.get_queue_stats(JobType::Clustering).await.unwrap();
        assert!(stats.is_paused);
        assert_eq!(stats.paused, 1);

        queue.resume_queue(JobType::Clustering).await.unwrap();
        let claimed = queue.claim_next(JobType::Clustering).await.unwrap();
        assert_eq!(claimed.map(|job| job.id), Some(job.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_job_requeued_once_then_failed() {
        let queue = JobQueue::in_memory(QueueConfig::default().with_max_attempts(5));
        let job = queue
            .add_job(JobType::SummaryGeneration, data(), JobOptions::default())
            .await
            .unwrap();

        let mut events = queue.subscribe();
        queue.claim_next(JobType::SummaryGeneration).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(queue.check_stalled(JobType::SummaryGeneration).await.unwrap(), 1);

        let view = queue.get_job_status(job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Waiting);

        queue.claim_next(JobType::SummaryGeneration).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(queue.check_stalled(JobType::SummaryGeneration).await.unwrap(), 1);

        let view = queue.get_job_status(job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Failed);

        let mut stalled = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, JobEvent::Stalled { .. }) {
                stalled += 1;
            }
        }
        assert_eq!(stalled, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_prevents_stall() {
        let queue = queue();
        queue
            .add_job(JobType::OcrProcessing, data(), JobOptions::default())
            .await
            .unwrap();
        let claimed = queue.claim_next(JobType::OcrProcessing).await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(queue.heartbeat(&claimed).await.unwrap());
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(queue.check_stalled(JobType::OcrProcessing).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_queue_respects_grace() {
        let queue = queue();
        queue
            .add_job(JobType::ExportGeneration, data(), JobOptions::default())
            .await
            .unwrap();
        let claimed = queue
            .claim_next(JobType::ExportGeneration)
            .await
            .unwrap()
            .unwrap();
        queue.complete(&claimed, serde_json::json!(null)).await.unwrap();

        assert_eq!(queue.clean_queue(JobType::ExportGeneration, None).await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(queue.clean_queue(JobType::ExportGeneration, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retention_caps_completed_jobs() {
        let queue = JobQueue::in_memory(QueueConfig::default().with_retention(2, 1));
        for _ in 0..4 {
            queue
                .add_job(JobType::TextCleaning, data(), JobOptions::default())
                .await
                .unwrap();
            let claimed = queue.claim_next(JobType::TextCleaning).await.unwrap().unwrap();
            queue.complete(&claimed, serde_json::json!(null)).await.unwrap();
        }

        let stats = queue.get_queue_stats(JobType::TextCleaning).await.unwrap();
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_evicted_jobs_keep_final_status() {
        let queue = JobQueue::in_memory(QueueConfig::default().with_retention(1, 1));
        let mut ids = Vec::new();
        for index in 0..3 {
            let job = queue
                .add_job(JobType::TextCleaning, data(), JobOptions::default())
                .await
                .unwrap();
            let claimed = queue.claim_next(JobType::TextCleaning).await.unwrap().unwrap();
            queue
                .complete(&claimed, serde_json::json!({ "index": index }))
                .await
                .unwrap();
            ids.push(job.id);
        }

        let stats = queue.get_queue_stats(JobType::TextCleaning).await.unwrap();
        assert_eq!(stats.completed, 1);

        for (index, id) in ids.iter().enumerate() {
            let view = queue.get_job_status(*id).await.unwrap().unwrap();
            assert_eq!(view.status, JobStatus::Completed);
            assert_eq!(view.result, Some(serde_json::json!({ "index": index })));
            assert!(view.finished_at.is_some());
            assert_eq!(view.data.field("note_id"), Some(&serde_json::json!("n-1")));
        }
        assert!(!queue.cancel_job(ids[0]).await.unwrap());
        assert!(queue.get_job_status(ids[0]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_evicted_failures_keep_reason() {
        let queue = JobQueue::in_memory(
            QueueConfig::default().with_retention(1, 1).with_max_attempts(1),
        );
        let mut ids = Vec::new();
        for _ in 0..2 {
            let job = queue
                .add_job(JobType::Clustering, data(), JobOptions::default())
                .await
                .unwrap();
            let claimed = queue.claim_next(JobType::Clustering).await.unwrap().unwrap();
            assert_eq!(queue.fail(&claimed, "boom").await.unwrap(), FailOutcome::Failed);
            ids.push(job.id);
        }

        let stats = queue.get_queue_stats(JobType::Clustering).await.unwrap();
        assert_eq!(stats.failed, 1);

        let view = queue.get_job_status(ids[0]).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.failed_reason.as_deref(), Some("boom"));
        assert_eq!(view.attempts_made, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_created_at_follows_queue_clock() {
        let queue = queue();
        tokio::time::advance(Duration::from_secs(3600)).await;

        let job = queue
            .add_job(JobType::OcrProcessing, data(), JobOptions::default())
            .await
            .unwrap();
        assert_eq!(job.data.created_at, queue.clock().now());

        let view = queue.get_job_status(job.id).await.unwrap().unwrap();
        assert_eq!(view.data.created_at, view.created_at);
    }

    #[tokio::test]
    async fn test_user_jobs_newest_first_with_limit() {
        let queue = queue();
        let user_id = Uuid::new_v4();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let job = queue
                .add_job(
                    JobType::OcrProcessing,
                    JobData::new(user_id, Uuid::new_v4()),
                    JobOptions::default(),
                )
                .await
                .unwrap();
            ids.push(job.id);
            tokio::task::yield_now().await;
        }
        queue
            .add_job(JobType::OcrProcessing, data(), JobOptions::default())
            .await
            .unwrap();

        let jobs = queue.get_user_jobs(user_id, Some(2)).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.user_id == user_id));
        assert!(jobs[0].created_at >= jobs[1].created_at);
    }
}
