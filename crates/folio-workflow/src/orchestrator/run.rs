//! Run task of one workflow.

use std::collections::HashMap;
use std::time::Duration;

use folio_queue::job::{JobData, JobOptions, JobPriority, JobStatus, JobType};
use serde_json::{Value, json};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::WorkflowOrchestrator;
use super::planner::plan_stage;
use crate::collaborator::{ProjectStatus, RollbackPlan, UploadStatus, WorkflowProgress};
use crate::workflow::{WorkflowStage, WorkflowState, WorkflowStatus};
use crate::{Error, Result, TRACING_TARGET_ORCHESTRATOR};

/// Terminal outcome of one job as observed by a stage.
enum Outcome {
    Completed(Value),
    Failed(String),
}

impl WorkflowOrchestrator {
    pub(super) fn spawn_run(&self, workflow_id: Uuid, cancel_token: CancellationToken) {
        let orchestrator = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;

                () = cancel_token.cancelled() => {
                    tracing::debug!(
                        target: TRACING_TARGET_ORCHESTRATOR,
                        workflow_id = %workflow_id,
                        "Workflow run stopped"
                    );
                }
                () = orchestrator.run(workflow_id) => {}
            }
        });
    }

    /// Walks the stages from the workflow's current one to completion.
    async fn run(&self, workflow_id: Uuid) {
        let started = self.registry.update(workflow_id, |state| {
            if state.status != WorkflowStatus::Pending {
                return false;
            }
            state.status = WorkflowStatus::Running;
            state.raise_progress(state.current_stage.progress_band().start);
            true
        });
        let Some(state) = started else {
            return;
        };

        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %workflow_id,
            project_id = %state.project_id,
            stage = %state.current_stage,
            "Workflow started"
        );

        if let Err(err) = self
            .set_project_status(state.project_id, ProjectStatus::Processing)
            .await
        {
            self.fail_workflow(workflow_id, state.current_stage, err)
                .await;
            return;
        }
        self.notify_progress(&state, "Workflow started").await;

        let mut stage = state.current_stage;
        while stage != WorkflowStage::Completed {
            let result = match self.run_stage(workflow_id, stage).await {
                Ok(result) => result,
                Err(err) => {
                    self.fail_workflow(workflow_id, stage, err).await;
                    return;
                }
            };

            let advanced = self.registry.update(workflow_id, |state| {
                if state.status != WorkflowStatus::Running {
                    return false;
                }
                state.advance(stage, result);
                true
            });
            let Some(state) = advanced else {
                return;
            };

            tracing::info!(
                target: TRACING_TARGET_ORCHESTRATOR,
                workflow_id = %workflow_id,
                stage = %stage,
                progress = state.progress,
                "Stage completed"
            );
            self.notify_progress(&state, format!("{stage} completed"))
                .await;
            stage = state.current_stage;
        }

        self.complete_workflow(workflow_id).await;
    }

    async fn run_stage(&self, workflow_id: Uuid, stage: WorkflowStage) -> Result<Value> {
        let state = self
            .registry
            .get(workflow_id)
            .ok_or(Error::NotFound(workflow_id))?;

        match stage.job_type() {
            Some(job_type) => self.run_jobs(&state, stage, job_type).await,
            None => self.wait_for_uploads(&state).await,
        }
    }

    /// Polls the image repository until no upload is pending.
    async fn wait_for_uploads(&self, state: &WorkflowState) -> Result<Value> {
        let project_id = state.project_id;
        let interval = self.config.upload_poll_interval();
        let timeout = self.config.upload_timeout();
        let mut ticker = ticker(interval);

        for _ in 0..max_ticks(timeout, interval) {
            ticker.tick().await;

            let images = self
                .repositories
                .images
                .find_by_project_id(project_id)
                .await
                .map_err(|err| Error::collaborator("find images", err))?;
            if images.is_empty() {
                return Err(Error::infrastructure(format!(
                    "no images found for project {project_id}"
                )));
            }

            let count = |status| images.iter().filter(|i| i.upload_status == status).count();
            let pending = count(UploadStatus::Pending);
            self.report_progress(state.id, WorkflowStage::Upload, images.len() - pending, images.len())
                .await;

            if pending == 0 {
                return Ok(json!({
                    "images": images.len(),
                    "uploaded": count(UploadStatus::Uploaded),
                    "failed": count(UploadStatus::Failed),
                }));
            }

            tracing::debug!(
                target: TRACING_TARGET_ORCHESTRATOR,
                workflow_id = %state.id,
                pending,
                "Waiting for uploads"
            );
        }

        Err(Error::StageTimeout {
            stage: WorkflowStage::Upload,
            timeout,
        })
    }

    /// Submits one job per work unit, then waits for the batch.
    async fn run_jobs(
        &self,
        state: &WorkflowState,
        stage: WorkflowStage,
        job_type: JobType,
    ) -> Result<Value> {
        let units = plan_stage(stage, state, &self.repositories).await?;
        if units.is_empty() {
            tracing::info!(
                target: TRACING_TARGET_ORCHESTRATOR,
                workflow_id = %state.id,
                stage = %stage,
                "Nothing to process"
            );
            return Ok(json!({ "jobs": 0, "skipped": true }));
        }

        let mut job_ids = Vec::with_capacity(units.len());
        for fields in units {
            let mut data =
                JobData::new(state.user_id, state.project_id).with_field("workflow_id", state.id.to_string());
            data.fields.extend(fields);
            let job_id = data.job_id;

            // Recorded before submission so cancellation always sees it.
            let recorded = self.registry.update(state.id, |state| {
                if state.status != WorkflowStatus::Running {
                    return false;
                }
                state.job_ids.entry(stage).or_default().push(job_id);
                true
            });
            if recorded.is_none() {
                return Err(Error::infrastructure("workflow is no longer running"));
            }

            let options = JobOptions::default().with_priority(JobPriority::High);
            self.queue.add_job(job_type, data, options).await?;
            job_ids.push(job_id);
        }

        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %state.id,
            stage = %stage,
            jobs = job_ids.len(),
            "Stage jobs submitted"
        );

        self.wait_for_jobs(state.id, stage, &job_ids).await
    }

    /// Polls job statuses until every job is terminal or the stage times out.
    ///
    /// Finished jobs evicted by queue retention still report their final
    /// state. A job whose queue entry and metadata are both gone counts as
    /// failed.
    async fn wait_for_jobs(
        &self,
        workflow_id: Uuid,
        stage: WorkflowStage,
        job_ids: &[Uuid],
    ) -> Result<Value> {
        let interval = self.config.poll_interval();
        let timeout = self.config.stage_timeout();
        let mut ticker = ticker(interval);
        let mut outcomes: HashMap<Uuid, Outcome> = HashMap::with_capacity(job_ids.len());

        for _ in 0..max_ticks(timeout, interval) {
            ticker.tick().await;

            for job_id in job_ids {
                if outcomes.contains_key(job_id) {
                    continue;
                }

                let outcome = match self.queue.get_job_status(*job_id).await? {
                    Some(view) if view.status == JobStatus::Completed => {
                        Outcome::Completed(view.result.unwrap_or(Value::Null))
                    }
                    Some(view) if view.status == JobStatus::Failed => Outcome::Failed(
                        view.failed_reason
                            .unwrap_or_else(|| "job failed without a reason".to_string()),
                    ),
                    Some(_) => continue,
                    None => Outcome::Failed("job and its metadata are gone".to_string()),
                };
                outcomes.insert(*job_id, outcome);
            }

            let completed = outcomes
                .values()
                .filter(|outcome| matches!(outcome, Outcome::Completed(_)))
                .count();
            self.report_progress(workflow_id, stage, completed, job_ids.len())
                .await;

            if outcomes.len() == job_ids.len() {
                return collect_results(stage, job_ids, outcomes);
            }
        }

        Err(Error::StageTimeout { stage, timeout })
    }

    /// Raises progress within the stage band and notifies on change.
    async fn report_progress(
        &self,
        workflow_id: Uuid,
        stage: WorkflowStage,
        done: usize,
        total: usize,
    ) {
        let progress = stage.progress_band().interpolate(done, total);
        let raised = self.registry.update(workflow_id, |state| {
            state.status == WorkflowStatus::Running && state.raise_progress(progress)
        });

        if let Some(state) = raised {
            self.notify_progress(&state, format!("{stage}: {done} of {total} done"))
                .await;
        }
    }

    async fn complete_workflow(&self, workflow_id: Uuid) {
        let now = self.clock.now();
        let completed = self.registry.update(workflow_id, |state| {
            if state.status != WorkflowStatus::Running {
                return false;
            }
            state.status = WorkflowStatus::Completed;
            state.current_stage = WorkflowStage::Completed;
            state.progress = 100;
            state.completed_at = Some(now);
            true
        });
        let Some(state) = completed else {
            return;
        };

        tracing::info!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %workflow_id,
            project_id = %state.project_id,
            "Workflow completed"
        );

        self.update_project_status(state.project_id, ProjectStatus::Completed)
            .await;
        self.notify_progress(&state, "Workflow completed").await;
        self.notify_status(&state, "Workflow completed").await;
    }

    /// Records a stage failure, applying the rollback plan if any.
    async fn fail_workflow(&self, workflow_id: Uuid, stage: WorkflowStage, err: Error) {
        let message = err.to_string();
        tracing::error!(
            target: TRACING_TARGET_ORCHESTRATOR,
            workflow_id = %workflow_id,
            stage = %stage,
            error = %message,
            "Workflow stage failed"
        );

        let Some(snapshot) = self.registry.get(workflow_id) else {
            return;
        };
        if snapshot.status != WorkflowStatus::Running {
            return;
        }

        let plan = match &self.rollback {
            Some(rollback) => match rollback.handle_workflow_failure(&snapshot, &err, stage).await {
                Ok(plan) => plan,
                Err(rollback_err) => {
                    tracing::warn!(
                        target: TRACING_TARGET_ORCHESTRATOR,
                        workflow_id = %workflow_id,
                        error = %rollback_err,
                        "Rollback handler failed, marking workflow failed"
                    );
                    RollbackPlan::MarkFailed
                }
            },
            None => RollbackPlan::MarkFailed,
        };

        let now = self.clock.now();
        let failed = self.registry.update(workflow_id, |state| {
            if state.status != WorkflowStatus::Running {
                return false;
            }
            state.status = WorkflowStatus::Failed;
            state.error = Some(message.clone());
            state.completed_at = Some(now);
            if let RollbackPlan::ResetTo { stage: checkpoint } = plan
                && checkpoint <= state.current_stage
            {
                state.current_stage = checkpoint;
                state.clear_from(checkpoint);
            }
            true
        });
        let Some(state) = failed else {
            return;
        };

        // Jobs of a timed-out stage may still be queued.
        if let Some(stage_jobs) = snapshot.job_ids.get(&stage) {
            self.cancel_jobs(stage_jobs.iter().copied()).await;
        }

        if let RollbackPlan::ResetTo { stage: checkpoint } = plan {
            tracing::info!(
                target: TRACING_TARGET_ORCHESTRATOR,
                workflow_id = %workflow_id,
                checkpoint = %checkpoint,
                "Workflow rolled back"
            );
        }

        self.update_project_status(state.project_id, ProjectStatus::Failed)
            .await;
        self.notify_status(&state, format!("Workflow failed: {message}"))
            .await;
    }

    /// Cancels jobs best-effort; returns how many were cancelled.
    pub(super) async fn cancel_jobs(&self, job_ids: impl IntoIterator<Item = Uuid>) -> usize {
        let mut cancelled = 0;
        for job_id in job_ids {
            match self.queue.cancel_job(job_id).await {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    target: TRACING_TARGET_ORCHESTRATOR,
                    job_id = %job_id,
                    error = %err,
                    "Failed to cancel job"
                ),
            }
        }
        cancelled
    }

    async fn set_project_status(&self, project_id: Uuid, status: ProjectStatus) -> Result<()> {
        self.repositories
            .projects
            .update_status(project_id, status)
            .await
            .map_err(|err| Error::collaborator("update project status", err))
    }

    async fn update_project_status(&self, project_id: Uuid, status: ProjectStatus) {
        if let Err(err) = self.set_project_status(project_id, status).await {
            tracing::warn!(
                target: TRACING_TARGET_ORCHESTRATOR,
                project_id = %project_id,
                status = %status,
                error = %err,
                "Failed to update project status"
            );
        }
    }

    async fn notify_progress(&self, state: &WorkflowState, message: impl Into<String>) {
        let payload = WorkflowProgress::from_state(state, message, self.clock.now());

        if let Err(err) = self
            .notifier
            .send_workflow_progress(state.user_id, &payload)
            .await
        {
            log_notify_error(state.id, "workflow progress", &*err);
        }
        if let Err(err) = self
            .notifier
            .send_project_workflow_progress(state.project_id, &payload)
            .await
        {
            log_notify_error(state.id, "project workflow progress", &*err);
        }
    }

    pub(super) async fn notify_status(&self, state: &WorkflowState, message: impl Into<String>) {
        let payload = WorkflowProgress::from_state(state, message, self.clock.now());
        if let Err(err) = self
            .notifier
            .send_workflow_status(state.user_id, &payload)
            .await
        {
            log_notify_error(state.id, "workflow status", &*err);
        }
    }
}

fn log_notify_error(workflow_id: Uuid, kind: &str, err: &(dyn std::error::Error + Send + Sync)) {
    tracing::warn!(
        target: TRACING_TARGET_ORCHESTRATOR,
        workflow_id = %workflow_id,
        notification = kind,
        error = %err,
        "Failed to send notification"
    );
}

fn collect_results(
    stage: WorkflowStage,
    job_ids: &[Uuid],
    mut outcomes: HashMap<Uuid, Outcome>,
) -> Result<Value> {
    let mut results = Vec::with_capacity(job_ids.len());
    let mut failed_ids = Vec::new();
    let mut reasons = Vec::new();

    for job_id in job_ids {
        match outcomes.remove(job_id) {
            Some(Outcome::Completed(result)) => results.push(result),
            Some(Outcome::Failed(reason)) => {
                failed_ids.push(*job_id);
                reasons.push(format!("job {job_id}: {reason}"));
            }
            None => {}
        }
    }

    if !failed_ids.is_empty() {
        return Err(Error::JobsFailed {
            stage,
            job_ids: failed_ids,
            reasons: reasons.join("; "),
        });
    }

    Ok(json!({
        "jobs": job_ids.len(),
        "job_ids": job_ids,
        "results": results,
    }))
}

/// Interval ticking immediately, then every `period`.
fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Hard ceiling on the number of checks within `timeout`.
fn max_ticks(timeout: Duration, period: Duration) -> u64 {
    let ticks = timeout.as_millis() / period.as_millis().max(1);
    u64::try_from(ticks).unwrap_or(u64::MAX).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_ticks() {
        assert_eq!(max_ticks(Duration::from_secs(300), Duration::from_secs(2)), 151);
        assert_eq!(max_ticks(Duration::from_secs(1), Duration::from_secs(5)), 1);
        assert_eq!(max_ticks(Duration::from_secs(1), Duration::ZERO), 1001);
    }

    #[test]
    fn test_collect_results_reports_every_failure() {
        let ok = Uuid::new_v4();
        let bad = Uuid::new_v4();
        let outcomes = HashMap::from([
            (ok, Outcome::Completed(json!({"clusters": 2}))),
            (bad, Outcome::Failed("insufficient text".to_string())),
        ]);

        let err = collect_results(WorkflowStage::Clustering, &[ok, bad], outcomes).unwrap_err();
        match err {
            Error::JobsFailed {
                job_ids, reasons, ..
            } => {
                assert_eq!(job_ids, vec![bad]);
                assert!(reasons.contains("insufficient text"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
