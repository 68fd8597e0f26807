//! Path parameter types for HTTP handlers.

use folio_queue::job::JobType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handler::{ErrorKind, Result};

/// Path parameters for workflow operations.
#[must_use]
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowPathParams {
    /// Unique identifier of the workflow.
    pub workflow_id: Uuid,
}

/// Path parameters for job operations.
#[must_use]
#[derive(Debug, Serialize, Deserialize)]
pub struct JobPathParams {
    /// Unique identifier of the job.
    pub job_id: Uuid,
}

/// Path parameters for user-scoped listings.
#[must_use]
#[derive(Debug, Serialize, Deserialize)]
pub struct UserPathParams {
    pub user_id: Uuid,
}

/// Path parameters for project-scoped listings.
#[must_use]
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectPathParams {
    pub project_id: Uuid,
}

/// Path parameters for queue operations.
#[must_use]
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuePathParams {
    /// Queue name (`ocr_processing`) or job type (`OCR_PROCESSING`).
    pub queue: String,
}

impl QueuePathParams {
    /// Resolves the job type of the addressed queue, ignoring case.
    pub fn job_type(&self) -> Result<JobType> {
        JobType::all()
            .find(|job_type| {
                job_type.queue_name().eq_ignore_ascii_case(&self.queue)
                    || job_type.as_ref().eq_ignore_ascii_case(&self.queue)
            })
            .ok_or_else(|| {
                ErrorKind::BadRequest
                    .with_message(format!("Unknown queue '{}'", self.queue))
                    .with_resource("queue")
            })
    }
}
