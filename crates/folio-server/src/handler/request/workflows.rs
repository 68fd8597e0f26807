use folio_workflow::workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request payload for starting a workflow.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflow {
    pub project_id: Uuid,
    /// User on whose behalf the workflow runs and who receives notifications.
    pub user_id: Uuid,
    /// Options forwarded to the stage jobs.
    #[serde(default)]
    pub config: WorkflowConfig,
}
