//! Workflow error to HTTP error conversion.

use folio_workflow::Error as WorkflowError;

use super::http_error::{Error as HttpError, ErrorKind};

impl From<WorkflowError> for HttpError<'static> {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::NotFound(workflow_id) => ErrorKind::NotFound
                .with_message("Workflow not found")
                .with_resource("workflow")
                .with_context(workflow_id.to_string()),

            err @ WorkflowError::InvalidState { .. } => ErrorKind::Conflict
                .with_message(err.to_string())
                .with_resource("workflow"),

            err @ (WorkflowError::Infrastructure(_) | WorkflowError::InvalidConfig { .. }) => {
                ErrorKind::BadRequest.with_message(err.to_string())
            }

            err @ WorkflowError::Collaborator { .. } => ErrorKind::ServiceUnavailable
                .with_message("A dependent service is unavailable")
                .with_context(err.to_string()),

            WorkflowError::Queue(err) => err.into(),

            err @ (WorkflowError::JobsFailed { .. } | WorkflowError::StageTimeout { .. }) => {
                ErrorKind::InternalServerError.with_context(err.to_string())
            }
        }
    }
}
