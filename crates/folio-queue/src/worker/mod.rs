//! Worker pool registry.
//!
//! For every job type with a registered [`StageProcessor`], a consumer pulls
//! jobs from the [`JobQueue`](crate::queue::JobQueue) with the type's fixed
//! concurrency, runs the processor, and records the outcome. A stall monitor
//! per type recovers jobs whose execution stopped sending heartbeats.

mod pool;
mod processor;
mod registry;

use serde::{Deserialize, Serialize};

pub use self::processor::{ProcessorFn, Processors, ProgressReporter, StageProcessor, processor_fn};
pub use self::registry::WorkerRegistry;
use crate::job::JobType;

/// Statistics of one worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub job_type: JobType,
    pub concurrency: usize,
    /// Jobs currently being processed.
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    /// Failed attempts that were rescheduled.
    pub retried: u64,
}
