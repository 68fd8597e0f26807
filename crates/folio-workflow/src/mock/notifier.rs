//! Notifier recording every update.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use folio_queue::BoxedError;
use folio_queue::job::JobProgress;
use folio_queue::queue::{JobEvent, JobRef};
use uuid::Uuid;

use crate::collaborator::{Notifier, WorkflowProgress};
use crate::workflow::WorkflowStatus;

/// One update received by a [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    WorkflowProgress {
        user_id: Uuid,
        payload: WorkflowProgress,
    },
    ProjectWorkflowProgress {
        project_id: Uuid,
        payload: WorkflowProgress,
    },
    WorkflowStatus {
        user_id: Uuid,
        payload: WorkflowProgress,
    },
    JobStatus {
        user_id: Uuid,
        event: JobEvent,
    },
    JobProgress {
        user_id: Uuid,
        job: JobRef,
        progress: JobProgress,
    },
}

/// Notifier keeping every update it was sent.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier that records updates but reports every delivery
    /// as failed.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    /// Returns every update received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the progress values sent to the user of a workflow, in order.
    pub fn progress_of(&self, workflow_id: Uuid) -> Vec<u8> {
        self.notifications()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::WorkflowProgress { payload, .. }
                    if payload.workflow_id == workflow_id =>
                {
                    Some(payload.progress)
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the terminal statuses sent for a workflow, in order.
    pub fn statuses_of(&self, workflow_id: Uuid) -> Vec<WorkflowStatus> {
        self.notifications()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::WorkflowStatus { payload, .. } if payload.workflow_id == workflow_id => {
                    Some(payload.status)
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the job events relayed so far.
    pub fn job_events(&self) -> Vec<JobEvent> {
        self.notifications()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::JobStatus { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    fn record(&self, notification: Notification) -> Result<(), BoxedError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);

        if self.failing.load(Ordering::SeqCst) {
            return Err("notification channel unreachable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_workflow_progress(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        self.record(Notification::WorkflowProgress {
            user_id,
            payload: payload.clone(),
        })
    }

    async fn send_project_workflow_progress(
        &self,
        project_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        self.record(Notification::ProjectWorkflowProgress {
            project_id,
            payload: payload.clone(),
        })
    }

    async fn send_workflow_status(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        self.record(Notification::WorkflowStatus {
            user_id,
            payload: payload.clone(),
        })
    }

    async fn send_job_status(&self, user_id: Uuid, event: &JobEvent) -> Result<(), BoxedError> {
        self.record(Notification::JobStatus {
            user_id,
            event: event.clone(),
        })
    }

    async fn send_job_progress(
        &self,
        user_id: Uuid,
        job: &JobRef,
        progress: &JobProgress,
    ) -> Result<(), BoxedError> {
        self.record(Notification::JobProgress {
            user_id,
            job: *job,
            progress: progress.clone(),
        })
    }
}
