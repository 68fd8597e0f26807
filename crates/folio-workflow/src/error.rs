//! Error types for workflow orchestration.

use std::time::Duration;

use folio_queue::BoxedError;
use uuid::Uuid;

use crate::workflow::{WorkflowStage, WorkflowStatus};

/// Result type for workflow operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for workflow operations.
///
/// Stage failures come in two flavors: [`Error::JobsFailed`] when at least
/// one job of the batch failed terminally and [`Error::StageTimeout`] when
/// the batch did not finish in time. Everything else is an infrastructure
/// error raised without retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// At least one job of a stage failed terminally.
    #[error("{stage} failed: {reasons}")]
    JobsFailed {
        stage: WorkflowStage,
        job_ids: Vec<Uuid>,
        reasons: String,
    },

    /// A stage did not finish within its allotted time.
    #[error("{stage} timed out after {}s", .timeout.as_secs())]
    StageTimeout {
        stage: WorkflowStage,
        timeout: Duration,
    },

    /// A precondition or dependency of the workflow is missing.
    #[error("{0}")]
    Infrastructure(String),

    /// No workflow with this id is registered.
    #[error("Workflow {0} not found")]
    NotFound(Uuid),

    /// The workflow is not in a status the operation accepts.
    #[error("Cannot {operation} workflow {workflow_id} while it is {status}")]
    InvalidState {
        workflow_id: Uuid,
        status: WorkflowStatus,
        operation: &'static str,
    },

    /// The job queue rejected an operation.
    #[error("Job queue error: {0}")]
    Queue(#[from] folio_queue::Error),

    /// An external collaborator returned an error.
    #[error("{operation} failed: {source}")]
    Collaborator {
        operation: &'static str,
        #[source]
        source: BoxedError,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an infrastructure error.
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    /// Create a collaborator error.
    pub fn collaborator(operation: &'static str, source: BoxedError) -> Self {
        Self::Collaborator { operation, source }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns the stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<WorkflowStage> {
        match self {
            Error::JobsFailed { stage, .. } | Error::StageTimeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true for job failures and stage timeouts.
    pub fn is_stage_failure(&self) -> bool {
        self.stage().is_some()
    }
}
