use folio_workflow::workflow::WorkflowState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflows owned by a user or a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflows {
    pub workflows: Vec<WorkflowState>,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCancelled {
    pub workflow_id: Uuid,
    /// False when the workflow had already finished.
    pub cancelled: bool,
}
