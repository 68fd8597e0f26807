//! Job model: types, priorities, payloads, statuses and retry policy.

mod backoff;
mod data;
#[allow(clippy::module_inception)]
mod job;
mod job_type;
mod metadata;
mod priority;
mod status;

pub use backoff::{BackoffKind, BackoffPolicy, DEFAULT_BACKOFF_BASE};
pub use data::{JobData, JobOptions, MAX_ENQUEUE_DELAY};
pub use job::{DEFAULT_MAX_ATTEMPTS, Job};
pub(crate) use job::next_claimable;
pub use job_type::JobType;
pub use metadata::{JobMetadata, JobOutcome};
pub use priority::JobPriority;
pub use status::{JobProgress, JobStatus};
