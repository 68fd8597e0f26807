//! Stage processor contract.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::job::{Job, JobProgress, JobType};
use crate::queue::JobQueue;
use crate::{BoxedError, TRACING_TARGET_WORKER};

/// Executes jobs of one type.
///
/// Processors run at least once per job and may run again after a failure
/// or a stall, so they must tolerate re-execution.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Processes a job, returning its JSON result.
    async fn process(&self, job: &Job, progress: &ProgressReporter) -> Result<Value, BoxedError>;
}

/// Relays progress of a running job to its queue.
#[derive(Clone)]
pub struct ProgressReporter {
    queue: JobQueue,
    job: Job,
}

impl ProgressReporter {
    pub(crate) fn new(queue: JobQueue, job: Job) -> Self {
        Self { queue, job }
    }

    /// Records the job's latest progress.
    ///
    /// Returns `false` if the job is no longer owned by this execution, in
    /// which case the processor may stop early.
    pub async fn report(&self, progress: JobProgress) -> bool {
        match self.queue.report_progress(&self.job, progress).await {
            Ok(owned) => owned,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_WORKER,
                    job_id = %self.job.id,
                    error = %err,
                    "Failed to record job progress"
                );
                true
            }
        }
    }
}

/// Processor built from an async closure.
pub struct ProcessorFn<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Wraps an async closure as a [`StageProcessor`].
pub fn processor_fn<F, Fut>(f: F) -> ProcessorFn<F, Fut>
where
    F: Fn(Job, ProgressReporter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxedError>> + Send + 'static,
{
    ProcessorFn {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> StageProcessor for ProcessorFn<F, Fut>
where
    F: Fn(Job, ProgressReporter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxedError>> + Send + 'static,
{
    async fn process(&self, job: &Job, progress: &ProgressReporter) -> Result<Value, BoxedError> {
        (self.f)(job.clone(), progress.clone()).await
    }
}

/// Stage processors keyed by job type.
#[derive(Clone, Default)]
pub struct Processors {
    processors: HashMap<JobType, Arc<dyn StageProcessor>>,
}

impl Processors {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the processor of a job type.
    #[must_use]
    pub fn with(mut self, job_type: JobType, processor: Arc<dyn StageProcessor>) -> Self {
        self.processors.insert(job_type, processor);
        self
    }

    /// Registers one processor for every job type.
    #[must_use]
    pub fn with_all(mut self, processor: Arc<dyn StageProcessor>) -> Self {
        for job_type in JobType::all() {
            self.processors.insert(job_type, processor.clone());
        }
        self
    }

    /// Returns the processor of a job type.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn StageProcessor>> {
        self.processors.get(&job_type).cloned()
    }

    /// Returns the number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns true if no processor is registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
