//! Persisted job record.

use std::cmp::Reverse;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BackoffPolicy, JobData, JobPriority, JobProgress, JobStatus, JobType};

/// Default number of attempts before a job is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A unit of asynchronous work as stored in its type's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier, equal to `data.job_id`.
    pub id: Uuid,
    pub job_type: JobType,
    pub priority: JobPriority,
    pub data: JobData,
    pub status: JobStatus,

    /// Number of times a worker has claimed the job.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,

    /// Submission order within the queue, used as the FIFO tie-break.
    pub sequence: u64,
    /// Earliest time a worker may claim the job.
    pub available_at: Timestamp,
    pub enqueued_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,

    /// Identifies the execution currently holding the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_token: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<Timestamp>,
    /// Number of times the job was found stalled.
    #[serde(default)]
    pub stalled_count: u32,
}

impl Job {
    /// Creates a new job in the waiting state.
    pub fn new(job_type: JobType, data: JobData, priority: JobPriority, now: Timestamp) -> Self {
        Self {
            id: data.job_id,
            job_type,
            priority,
            data,
            status: JobStatus::Waiting,
            attempts_made: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            progress: None,
            result: None,
            failed_reason: None,
            sequence: 0,
            available_at: now,
            enqueued_at: now,
            started_at: None,
            finished_at: None,
            claim_token: None,
            heartbeat_at: None,
            stalled_count: 0,
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, backoff: BackoffPolicy) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Schedules the job to become eligible at the given time.
    #[must_use]
    pub fn delayed_until(mut self, available_at: Timestamp) -> Self {
        if available_at > self.enqueued_at {
            self.status = JobStatus::Delayed;
            self.available_at = available_at;
        }
        self
    }

    /// Returns true if a worker may claim the job at `now`.
    pub fn is_claimable(&self, now: Timestamp) -> bool {
        matches!(self.status, JobStatus::Waiting | JobStatus::Delayed) && self.available_at <= now
    }

    /// Returns true if the given claim token owns the job.
    pub fn is_claimed_by(&self, token: Uuid) -> bool {
        self.status == JobStatus::Active && self.claim_token == Some(token)
    }

    /// Returns true if the job has attempts left.
    #[inline]
    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Dispatch ordering key: higher priority first, then lower sequence,
    /// then the older time-ordered id.
    pub(crate) fn dispatch_key(&self) -> (JobPriority, Reverse<u64>, Reverse<Uuid>) {
        (self.priority, Reverse(self.sequence), Reverse(self.id))
    }

    /// Transitions the job to active under a new claim.
    pub(crate) fn mark_active(&mut self, token: Uuid, now: Timestamp) {
        self.status = JobStatus::Active;
        self.attempts_made += 1;
        self.claim_token = Some(token);
        self.started_at = Some(now);
        self.heartbeat_at = Some(now);
    }
}

/// Picks the next job to dispatch among `jobs`.
pub(crate) fn next_claimable<'a>(
    jobs: impl IntoIterator<Item = &'a Job>,
    now: Timestamp,
) -> Option<&'a Job> {
    jobs.into_iter()
        .filter(|job| job.is_claimable(now))
        .max_by_key(|job| job.dispatch_key())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::add_duration;

    fn job(priority: JobPriority, sequence: u64) -> Job {
        let mut job = Job::new(
            JobType::OcrProcessing,
            JobData::new(Uuid::nil(), Uuid::nil()),
            priority,
            Timestamp::UNIX_EPOCH,
        );
        job.sequence = sequence;
        job
    }

    #[test]
    fn test_priority_then_fifo() {
        let now = Timestamp::UNIX_EPOCH;
        let jobs = vec![
            job(JobPriority::Normal, 1),
            job(JobPriority::High, 3),
            job(JobPriority::High, 2),
            job(JobPriority::Low, 0),
        ];

        let next = next_claimable(&jobs, now).unwrap();
        assert_eq!(next.priority, JobPriority::High);
        assert_eq!(next.sequence, 2);
    }

    #[test]
    fn test_equal_sequence_falls_back_to_id() {
        let now = Timestamp::UNIX_EPOCH;
        let first = job(JobPriority::Normal, 7);
        let second = job(JobPriority::Normal, 7);
        assert!(first.id < second.id);

        let jobs = vec![second, first.clone()];
        let next = next_claimable(&jobs, now).unwrap();
        assert_eq!(next.id, first.id);
    }

    #[test]
    fn test_delayed_job_not_claimable_early() {
        let now = Timestamp::UNIX_EPOCH;
        let later = add_duration(now, Duration::from_secs(10));
        let delayed = job(JobPriority::Critical, 0).delayed_until(later);

        assert_eq!(delayed.status, JobStatus::Delayed);
        assert!(!delayed.is_claimable(now));
        assert!(delayed.is_claimable(later));
    }

    #[test]
    fn test_mark_active_counts_attempt() {
        let mut job = job(JobPriority::Normal, 0);
        let token = Uuid::new_v4();
        job.mark_active(token, Timestamp::UNIX_EPOCH);

        assert_eq!(job.attempts_made, 1);
        assert!(job.is_claimed_by(token));
        assert!(!job.is_claimed_by(Uuid::new_v4()));
    }
}
