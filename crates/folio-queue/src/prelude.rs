//! Prelude module for folio-queue.
//!
//! Re-exports the most commonly used types and traits, making it easy to
//! import everything needed to enqueue and process jobs with a single `use`.
//!
//! # Example
//!
//! ```rust,ignore
//! use folio_queue::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let queue = JobQueue::in_memory(QueueConfig::default());
//! let data = JobData::new(user_id, project_id).with_field("image_id", image_id.to_string());
//! let job = queue.add_job(JobType::OcrProcessing, data, JobOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

// Job model
pub use crate::job::{
    Job, JobData, JobMetadata, JobOptions, JobPriority, JobProgress, JobStatus, JobType,
};
// Store backends
pub use crate::nats::{NatsClient, NatsConfig};
// Queue service
pub use crate::queue::{JobEvent, JobQueue, JobQueueService, JobView, QueueStats};
pub use crate::store::{MetadataStore, QueueStore};
// Worker pools
pub use crate::worker::{
    Processors, ProgressReporter, StageProcessor, WorkerRegistry, WorkerStats, processor_fn,
};
pub use crate::{BoxedError, Error, QueueConfig, Result};
