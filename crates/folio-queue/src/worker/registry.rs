//! Worker pool registry.

use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pool::{StallMonitor, Worker, WorkerGauge};
use super::{Processors, WorkerStats};
use crate::job::JobType;
use crate::queue::JobQueue;
use crate::{Error, Result, TRACING_TARGET_WORKER};

/// Handles for the background worker pools of every job type.
///
/// Holds the join handles of all spawned consumers and stall monitors,
/// allowing graceful shutdown and status monitoring.
pub struct WorkerRegistry {
    handles: Mutex<Vec<(JobType, JoinHandle<Result<()>>)>>,
    gauges: Vec<WorkerGauge>,
    cancel_token: CancellationToken,
}

impl WorkerRegistry {
    /// Spawns one consumer and one stall monitor per registered processor.
    ///
    /// Job types without a processor get no consumer; their jobs stay queued.
    pub fn spawn(queue: &JobQueue, processors: &Processors) -> Self {
        let cancel_token = CancellationToken::new();
        let mut handles = Vec::new();
        let mut gauges = Vec::new();

        for job_type in JobType::all() {
            let Some(processor) = processors.get(job_type) else {
                tracing::warn!(
                    target: TRACING_TARGET_WORKER,
                    job_type = %job_type,
                    "No stage processor registered, jobs of this type will not run"
                );
                continue;
            };

            let worker = Worker::new(queue.clone(), job_type, processor, cancel_token.clone());
            gauges.push(worker.gauge());
            handles.push((job_type, worker.spawn()));

            let monitor = StallMonitor::new(queue.clone(), job_type, cancel_token.clone());
            handles.push((job_type, monitor.spawn()));
        }

        tracing::info!(
            target: TRACING_TARGET_WORKER,
            pools = gauges.len(),
            "Worker pools started"
        );

        Self {
            handles: Mutex::new(handles),
            gauges,
            cancel_token,
        }
    }

    /// Returns the statistics of every running pool.
    pub fn stats(&self) -> Vec<WorkerStats> {
        self.gauges.iter().map(WorkerGauge::stats).collect()
    }

    /// Returns the statistics of one pool.
    pub fn stats_for(&self, job_type: JobType) -> Option<WorkerStats> {
        self.gauges
            .iter()
            .map(WorkerGauge::stats)
            .find(|stats| stats.job_type == job_type)
    }

    /// Requests graceful shutdown of all pools.
    ///
    /// Consumers stop claiming and finish the jobs they already hold. Use
    /// [`abort_all`](Self::abort_all) for immediate cancellation.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Aborts all pool tasks immediately, including in-flight jobs.
    pub fn abort_all(&self) {
        self.cancel_token.cancel();
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in handles.iter() {
            handle.abort();
        }
    }

    /// Checks if all pool tasks are still running.
    pub fn all_running(&self) -> bool {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.iter().all(|(_, handle)| !handle.is_finished())
    }

    /// Waits for all pool tasks to finish, returning the first error.
    pub async fn wait_all(&self) -> Result<()> {
        let handles = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        let mut first_error = None;
        for (job_type, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(Error::operation(
                    "worker_join",
                    format!("{job_type} worker panicked: {err}"),
                )),
            };

            if let Err(err) = outcome {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    job_type = %job_type,
                    error = %err,
                    "Worker stopped with error"
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerRegistry {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
