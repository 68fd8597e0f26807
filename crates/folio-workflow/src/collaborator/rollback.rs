//! Optional handling of stage failures.

use async_trait::async_trait;
use folio_queue::BoxedError;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::workflow::{WorkflowStage, WorkflowState};

/// What to do with a workflow whose stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RollbackPlan {
    /// Keep all results and job ids for inspection.
    MarkFailed,
    /// Drop results and job ids from `stage` on, so that a restart resumes
    /// from there.
    ResetTo { stage: WorkflowStage },
}

/// Decides how a failed workflow is rolled back.
///
/// The workflow is marked failed whatever the plan; the plan only decides
/// where a later restart resumes.
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    async fn handle_workflow_failure(
        &self,
        state: &WorkflowState,
        error: &Error,
        stage: WorkflowStage,
    ) -> Result<RollbackPlan, BoxedError>;
}

/// Rolls back to the latest checkpoint stage not after the failed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRollback {
    checkpoints: Vec<WorkflowStage>,
}

impl CheckpointRollback {
    /// Creates a handler with the given checkpoint stages.
    pub fn new(checkpoints: impl IntoIterator<Item = WorkflowStage>) -> Self {
        let mut checkpoints: Vec<_> = checkpoints.into_iter().collect();
        checkpoints.sort();
        checkpoints.dedup();
        Self { checkpoints }
    }

    /// Returns the checkpoint a failure at `stage` rolls back to.
    pub fn checkpoint_for(&self, stage: WorkflowStage) -> Option<WorkflowStage> {
        self.checkpoints
            .iter()
            .rev()
            .find(|checkpoint| **checkpoint <= stage)
            .copied()
    }
}

impl Default for CheckpointRollback {
    /// Checkpoints after the upload and before clustering.
    fn default() -> Self {
        Self::new([WorkflowStage::OcrProcessing, WorkflowStage::Clustering])
    }
}

#[async_trait]
impl RollbackHandler for CheckpointRollback {
    async fn handle_workflow_failure(
        &self,
        _state: &WorkflowState,
        _error: &Error,
        stage: WorkflowStage,
    ) -> Result<RollbackPlan, BoxedError> {
        Ok(match self.checkpoint_for(stage) {
            Some(checkpoint) => RollbackPlan::ResetTo { stage: checkpoint },
            None => RollbackPlan::MarkFailed,
        })
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use uuid::Uuid;

    use super::*;
    use crate::workflow::WorkflowConfig;

    #[test]
    fn test_checkpoint_selection() {
        let rollback = CheckpointRollback::default();
        assert_eq!(rollback.checkpoint_for(WorkflowStage::Upload), None);
        assert_eq!(
            rollback.checkpoint_for(WorkflowStage::TextCleaning),
            Some(WorkflowStage::OcrProcessing)
        );
        assert_eq!(
            rollback.checkpoint_for(WorkflowStage::SummaryGeneration),
            Some(WorkflowStage::Clustering)
        );
        assert_eq!(
            rollback.checkpoint_for(WorkflowStage::Clustering),
            Some(WorkflowStage::Clustering)
        );
    }

    #[tokio::test]
    async fn test_plan_without_checkpoint_marks_failed() {
        let rollback = CheckpointRollback::new([WorkflowStage::ExportGeneration]);
        let state = WorkflowState::new(
            Uuid::nil(),
            Uuid::nil(),
            WorkflowConfig::default(),
            Timestamp::UNIX_EPOCH,
        );
        let error = Error::infrastructure("no images found");

        let plan = rollback
            .handle_workflow_failure(&state, &error, WorkflowStage::Upload)
            .await
            .unwrap();
        assert_eq!(plan, RollbackPlan::MarkFailed);
    }
}
