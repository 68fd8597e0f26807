//! Workflow orchestrator.
//!
//! Each started workflow gets one sequential run task walking the
//! [`WorkflowStage`] sequence. A stage plans its work units from the
//! repositories, submits one job per unit at [`JobPriority::High`], and polls
//! the queue until the whole batch is terminal or the stage times out. Many
//! workflows run concurrently; job concurrency is bounded per job type by the
//! worker pools, not by the orchestrator.
//!
//! [`JobPriority::High`]: folio_queue::job::JobPriority::High

mod planner;
mod run;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use folio_queue::Clock;
use folio_queue::queue::JobQueueService;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::collaborator::{Notifier, Repositories, RollbackHandler};
use crate::registry::WorkflowRegistry;
use crate::workflow::{WorkflowConfig, WorkflowState, WorkflowStatus};
use crate::{Error, OrchestratorConfig, Result, TRACING_TARGET_ORCHESTRATOR};

/// Drives workflows through the stage pipeline.
///
/// Cheap to clone; clones share the registry and run tasks.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    queue: Arc<dyn JobQueueService>,
    repositories: Repositories,
    notifier: Arc<dyn Notifier>,
    rollback: Option<Arc<dyn RollbackHandler>>,
    registry: Arc<WorkflowRegistry>,
    config: OrchestratorConfig,
    clock: Clock,
    tracker: TaskTracker,
    shutdown_token: CancellationToken,
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator without a rollback handler.
    pub fn new(
        queue: Arc<dyn JobQueueService>,
        repositories: Repositories,
        notifier: Arc<dyn Notifier>,
        config: OrchestratorConfig,
    ) -> Self {
        let clock = Clock::new();
        Self {
            queue,
            repositories,
            notifier,
            rollback: None,
            registry: Arc::new(WorkflowRegistry::new(config.retention(), clock)),
            config,
            clock,
            tracker: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Sets the handler consulted when a stage fails.
    #[must_use]
    pub fn with_rollback(mut self, rollback: Arc<dyn RollbackHandler>) -> Self {
        self.rollback = Some(rollback);
        self
    }

    /// Sets the clock; typically the job queue's, so both agree on time.
    ///
    /// Must be called before any workflow is started.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.registry = Arc::new(WorkflowRegistry::new(self.config.retention(), clock));
        self
    }

    /// Returns the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the workflow registry.
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Starts a workflow for a project and returns its initial state.
    ///
    /// The engine does not prevent two concurrent workflows for the same
    /// project.
    #[tracing::instrument(skip(self, config), target = TRACING_TARGET_ORCHESTRATOR)]
    pub async fn start_workflow(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        config: WorkflowConfig,
    ) -> Result<WorkflowState> {
        let project = self
            .repositories
            .projects
            .find_by_id(project_id)
            .await
            .map_err(|err| Error::collaborator("find project", err))?
            .ok_or_else(|| Error::infrastructure(format!("project {project_id} not found")))?;

        let state = WorkflowState::new(project_id, user_id, config, self.clock.now());
        let cancel_token = self.shutdown_token.child_token();
        self.registry.insert(state.clone(), cancel_token.clone());

        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %state.id,
            project_id = %project_id,
            project_name = %project.name,
            "Workflow created"
        );

        self.spawn_run(state.id, cancel_token);
        Ok(state)
    }

    /// Returns the current state of a workflow.
    pub fn get_status(&self, workflow_id: Uuid) -> Option<WorkflowState> {
        self.registry.get(workflow_id)
    }

    /// Cancels a workflow that has not finished.
    ///
    /// Stops the run task and cancels every job submitted so far; jobs that
    /// already finished are skipped. Stage results and job ids are kept.
    /// Returns false if the workflow already reached a terminal status.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_ORCHESTRATOR)]
    pub async fn cancel_workflow(&self, workflow_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let cancelled = self.registry.update(workflow_id, |state| {
            if state.is_terminal() {
                return false;
            }
            state.status = WorkflowStatus::Cancelled;
            state.completed_at = Some(now);
            true
        });

        let Some(state) = cancelled else {
            return match self.registry.get(workflow_id) {
                Some(_) => Ok(false),
                None => Err(Error::NotFound(workflow_id)),
            };
        };

        if let Some(cancel_token) = self.registry.cancel_token(workflow_id) {
            cancel_token.cancel();
        }

        let cancelled_jobs = self.cancel_jobs(state.all_job_ids()).await;
        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %workflow_id,
            stage = %state.current_stage,
            cancelled_jobs,
            "Workflow cancelled"
        );

        self.notify_status(&state, "Workflow cancelled").await;
        Ok(true)
    }

    /// Resumes a failed workflow from its current stage.
    ///
    /// Results and job ids of the current stage and later ones are dropped
    /// before the stage is re-run.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_ORCHESTRATOR)]
    pub async fn restart_failed(&self, workflow_id: Uuid) -> Result<WorkflowState> {
        let restarted = self.registry.update(workflow_id, |state| {
            if state.status != WorkflowStatus::Failed {
                return false;
            }
            state.status = WorkflowStatus::Pending;
            state.error = None;
            state.completed_at = None;
            state.clear_from(state.current_stage);
            true
        });

        let Some(state) = restarted else {
            return Err(match self.registry.get(workflow_id) {
                Some(state) => Error::InvalidState {
                    workflow_id,
                    status: state.status,
                    operation: "restart",
                },
                None => Error::NotFound(workflow_id),
            });
        };

        let cancel_token = self.shutdown_token.child_token();
        self.registry
            .replace_cancel_token(workflow_id, cancel_token.clone());

        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %workflow_id,
            stage = %state.current_stage,
            "Restarting failed workflow"
        );

        self.spawn_run(workflow_id, cancel_token);
        Ok(state)
    }

    /// Returns the workflows of a user, newest first.
    pub fn list_by_user(&self, user_id: Uuid) -> Vec<WorkflowState> {
        self.registry.list_by_user(user_id)
    }

    /// Returns the workflows of a project, newest first.
    pub fn list_by_project(&self, project_id: Uuid) -> Vec<WorkflowState> {
        self.registry.list_by_project(project_id)
    }

    /// Evicts finished workflows past their retention.
    pub fn sweep(&self) -> usize {
        self.registry.sweep(self.clock.now())
    }

    /// Spawns a task sweeping the registry until shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.config.sweep_interval());
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    () = orchestrator.shutdown_token.cancelled() => break,
                    _ = ticker.tick() => {
                        orchestrator.sweep();
                    }
                }
            }
        })
    }

    /// Stops every run task and the sweeper.
    ///
    /// Workflow states are left as they are; submitted jobs stay queued.
    pub fn shutdown(&self) {
        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            running = self.tracker.len(),
            "Stopping workflow orchestrator"
        );
        self.shutdown_token.cancel();
        self.registry.cancel_all();
        self.tracker.close();
    }

    /// Waits for every run task to finish after [`shutdown`](Self::shutdown).
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("has_rollback", &self.rollback.is_some())
            .finish_non_exhaustive()
    }
}
