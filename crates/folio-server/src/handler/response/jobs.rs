use folio_queue::job::JobMetadata;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job metadata records, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jobs {
    pub jobs: Vec<JobMetadata>,
}

/// Outcome of a job cancellation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCancelled {
    pub job_id: Uuid,
    /// False when the job had already finished or was unknown.
    pub cancelled: bool,
}
