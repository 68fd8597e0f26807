//! Notification fan-out contract.

use async_trait::async_trait;
use folio_queue::BoxedError;
use folio_queue::job::JobProgress;
use folio_queue::queue::{JobEvent, JobRef};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TRACING_TARGET_NOTIFY;
use crate::workflow::{WorkflowStage, WorkflowState, WorkflowStatus};

/// Workflow update pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub workflow_id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub status: WorkflowStatus,
    pub stage: WorkflowStage,
    pub progress: u8,
    /// Human-readable description of the update.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl WorkflowProgress {
    /// Builds the update describing `state`.
    pub fn from_state(state: &WorkflowState, message: impl Into<String>, now: Timestamp) -> Self {
        Self {
            workflow_id: state.id,
            project_id: state.project_id,
            user_id: state.user_id,
            status: state.status,
            stage: state.current_stage,
            progress: state.progress,
            message: message.into(),
            error: state.error.clone(),
            timestamp: now,
        }
    }
}

/// Pushes workflow and job updates to subscribers.
///
/// Delivery is best-effort: callers log errors and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a workflow progress update to its user.
    async fn send_workflow_progress(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError>;

    /// Sends a workflow progress update to everyone following the project.
    async fn send_project_workflow_progress(
        &self,
        project_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError>;

    /// Sends a terminal workflow status to its user.
    async fn send_workflow_status(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError>;

    /// Sends a job lifecycle transition to the job's user.
    async fn send_job_status(&self, user_id: Uuid, event: &JobEvent) -> Result<(), BoxedError>;

    /// Sends the latest progress of a running job to the job's user.
    async fn send_job_progress(
        &self,
        user_id: Uuid,
        job: &JobRef,
        progress: &JobProgress,
    ) -> Result<(), BoxedError>;
}

/// Notifier that only logs updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_workflow_progress(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        tracing::debug!(
            target: TRACING_TARGET_NOTIFY,
            user_id = %user_id,
            workflow_id = %payload.workflow_id,
            stage = %payload.stage,
            progress = payload.progress,
            "Workflow progress"
        );
        Ok(())
    }

    async fn send_project_workflow_progress(
        &self,
        project_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        tracing::trace!(
            target: TRACING_TARGET_NOTIFY,
            project_id = %project_id,
            workflow_id = %payload.workflow_id,
            progress = payload.progress,
            "Project workflow progress"
        );
        Ok(())
    }

    async fn send_workflow_status(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        tracing::info!(
            target: TRACING_TARGET_NOTIFY,
            user_id = %user_id,
            workflow_id = %payload.workflow_id,
            status = %payload.status,
            message = %payload.message,
            "Workflow status"
        );
        Ok(())
    }

    async fn send_job_status(&self, user_id: Uuid, event: &JobEvent) -> Result<(), BoxedError> {
        let job = event.job();
        tracing::debug!(
            target: TRACING_TARGET_NOTIFY,
            user_id = %user_id,
            job_id = %job.job_id,
            job_type = %job.job_type,
            status = ?event.status(),
            "Job status"
        );
        Ok(())
    }

    async fn send_job_progress(
        &self,
        user_id: Uuid,
        job: &JobRef,
        progress: &JobProgress,
    ) -> Result<(), BoxedError> {
        tracing::trace!(
            target: TRACING_TARGET_NOTIFY,
            user_id = %user_id,
            job_id = %job.job_id,
            percentage = progress.percentage,
            "Job progress"
        );
        Ok(())
    }
}
