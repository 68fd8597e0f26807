//! Bounded-concurrency consumer of one job type.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::{ProgressReporter, StageProcessor, WorkerStats};
use crate::job::{Job, JobType};
use crate::queue::{FailOutcome, JobQueue};
use crate::{BoxedError, Result, TRACING_TARGET_WORKER};

/// Counters shared between a worker and its stats readers.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// Live handle for reading a worker's statistics.
#[derive(Debug, Clone)]
pub(crate) struct WorkerGauge {
    job_type: JobType,
    semaphore: Arc<Semaphore>,
    counters: Arc<WorkerCounters>,
}

impl WorkerGauge {
    pub(crate) fn stats(&self) -> WorkerStats {
        let concurrency = self.job_type.concurrency();
        WorkerStats {
            job_type: self.job_type,
            concurrency,
            running: concurrency.saturating_sub(self.semaphore.available_permits()),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
        }
    }
}

/// Consumer pulling jobs of one type from the queue.
///
/// Concurrency is capped by a semaphore sized to the type's fixed limit: a
/// permit is acquired before a job is claimed and held until the job's
/// outcome is recorded. The limit is local to this process.
pub(crate) struct Worker {
    queue: JobQueue,
    job_type: JobType,
    processor: Arc<dyn StageProcessor>,
    cancel_token: CancellationToken,
    semaphore: Arc<Semaphore>,
    counters: Arc<WorkerCounters>,
}

impl Worker {
    pub(crate) fn new(
        queue: JobQueue,
        job_type: JobType,
        processor: Arc<dyn StageProcessor>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            queue,
            job_type,
            processor,
            cancel_token,
            semaphore: Arc::new(Semaphore::new(job_type.concurrency())),
            counters: Arc::new(WorkerCounters::default()),
        }
    }

    pub(crate) fn gauge(&self) -> WorkerGauge {
        WorkerGauge {
            job_type: self.job_type,
            semaphore: self.semaphore.clone(),
            counters: self.counters.clone(),
        }
    }

    /// Spawns the worker as a background task.
    pub(crate) fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs the claim loop until cancelled, then drains in-flight jobs.
    async fn run(self) -> Result<()> {
        tracing::info!(
            target: TRACING_TARGET_WORKER,
            job_type = %self.job_type,
            concurrency = self.job_type.concurrency(),
            "Starting worker"
        );

        let waker = self.queue.waker(self.job_type);
        let poll_interval = self.queue.config().poll_interval();
        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,

                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::error!(
                            target: TRACING_TARGET_WORKER,
                            job_type = %self.job_type,
                            "Semaphore closed, stopping worker"
                        );
                        break;
                    }
                },
            };

            match self.queue.claim_next(self.job_type).await {
                Ok(Some(job)) => {
                    let execution = Execution {
                        queue: self.queue.clone(),
                        processor: self.processor.clone(),
                        counters: self.counters.clone(),
                        heartbeat_interval: self.queue.config().heartbeat_interval(),
                    };
                    in_flight.spawn(async move {
                        // Hold permit until the outcome is recorded
                        let _permit = permit;
                        execution.execute(job).await;
                    });
                    continue;
                }
                Ok(None) => {
                    drop(permit);
                }
                Err(err) => {
                    drop(permit);
                    tracing::error!(
                        target: TRACING_TARGET_WORKER,
                        job_type = %self.job_type,
                        error = %err,
                        "Failed to claim job"
                    );
                }
            }

            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                () = waker.notified() => {}
                () = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!(
            target: TRACING_TARGET_WORKER,
            job_type = %self.job_type,
            in_flight = in_flight.len(),
            "Shutdown requested, draining worker"
        );
        while in_flight.join_next().await.is_some() {}

        Ok(())
    }
}

/// Everything needed to run one claimed job to its outcome.
struct Execution {
    queue: JobQueue,
    processor: Arc<dyn StageProcessor>,
    counters: Arc<WorkerCounters>,
    heartbeat_interval: Duration,
}

impl Execution {
    async fn execute(self, job: Job) {
        tracing::info!(
            target: TRACING_TARGET_WORKER,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts_made,
            "Processing job"
        );

        let outcome = self.run_processor(&job).await;
        let recorded = match outcome {
            Ok(Ok(result)) => self.queue.complete(&job, result).await.map(|owned| {
                if owned {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
            }),
            Ok(Err(err)) => self.record_failure(&job, err.to_string()).await,
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    "stage processor panicked".to_string()
                } else {
                    "stage processor was cancelled".to_string()
                };
                self.record_failure(&job, reason).await
            }
        };

        if let Err(err) = recorded {
            tracing::error!(
                target: TRACING_TARGET_WORKER,
                job_id = %job.id,
                error = %err,
                "Failed to record job outcome"
            );
        }
    }

    /// Runs the processor on its own task while refreshing the heartbeat.
    async fn run_processor(
        &self,
        job: &Job,
    ) -> std::result::Result<std::result::Result<Value, BoxedError>, JoinError> {
        let processor = self.processor.clone();
        let reporter = ProgressReporter::new(self.queue.clone(), job.clone());
        let task_job = job.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            processor.process(&task_job, &reporter).await
        }));

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                outcome = &mut task.0 => return outcome,
                _ = heartbeat.tick() => {
                    match self.queue.heartbeat(job).await {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!(
                            target: TRACING_TARGET_WORKER,
                            job_id = %job.id,
                            "Job no longer owned, result will be discarded"
                        ),
                        Err(err) => tracing::warn!(
                            target: TRACING_TARGET_WORKER,
                            job_id = %job.id,
                            error = %err,
                            "Failed to refresh heartbeat"
                        ),
                    }
                }
            }
        }
    }

    async fn record_failure(&self, job: &Job, reason: String) -> Result<()> {
        match self.queue.fail(job, reason).await? {
            FailOutcome::Retrying { .. } => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
            }
            FailOutcome::Failed => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            FailOutcome::Discarded => {}
        }
        Ok(())
    }
}

/// Aborts the wrapped task when dropped, so an aborted execution takes its
/// processor down with it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Periodically recovers stalled jobs of one type.
pub(crate) struct StallMonitor {
    queue: JobQueue,
    job_type: JobType,
    cancel_token: CancellationToken,
}

impl StallMonitor {
    pub(crate) fn new(queue: JobQueue, job_type: JobType, cancel_token: CancellationToken) -> Self {
        Self {
            queue,
            job_type,
            cancel_token,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.queue.config().stall_interval());
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.queue.check_stalled(self.job_type).await {
                        tracing::error!(
                            target: TRACING_TARGET_WORKER,
                            job_type = %self.job_type,
                            error = %err,
                            "Stall check failed"
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
