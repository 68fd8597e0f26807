//! Relay of job lifecycle events to the notifier.

use std::sync::Arc;

use folio_queue::queue::{JobEvent, JobQueue};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_NOTIFY;
use crate::collaborator::Notifier;

/// Forwards every job event of a queue to a [`Notifier`], best-effort.
pub struct JobEventRelay {
    events: Receiver<JobEvent>,
    notifier: Arc<dyn Notifier>,
    cancel_token: CancellationToken,
}

impl JobEventRelay {
    /// Subscribes to the queue's events.
    ///
    /// Only events emitted after this call are relayed.
    pub fn new(
        queue: &JobQueue,
        notifier: Arc<dyn Notifier>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            events: queue.subscribe(),
            notifier,
            cancel_token,
        }
    }

    /// Spawns the relay as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => break,
                event = self.events.recv() => event,
            };

            match event {
                Ok(event) => self.forward(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: TRACING_TARGET_NOTIFY,
                        skipped,
                        "Job event relay lagged, events dropped"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }

        tracing::debug!(target: TRACING_TARGET_NOTIFY, "Job event relay stopped");
    }

    async fn forward(&self, event: &JobEvent) {
        let job = event.job();
        let delivered = match event {
            JobEvent::Progress { job, progress } => {
                self.notifier
                    .send_job_progress(job.user_id, job, progress)
                    .await
            }
            _ => self.notifier.send_job_status(job.user_id, event).await,
        };

        if let Err(err) = delivered {
            tracing::warn!(
                target: TRACING_TARGET_NOTIFY,
                job_id = %job.job_id,
                error = %err,
                "Failed to relay job event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use folio_queue::QueueConfig;
    use folio_queue::job::{JobData, JobOptions, JobProgress, JobType};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::mock::{Notification, RecordingNotifier};

    #[tokio::test(start_paused = true)]
    async fn test_events_are_forwarded() {
        let queue = JobQueue::in_memory(QueueConfig::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let cancel_token = CancellationToken::new();
        let relay = JobEventRelay::new(&queue, notifier.clone(), cancel_token.clone()).spawn();

        let user_id = Uuid::new_v4();
        let job = queue
            .add_job(
                JobType::Clustering,
                JobData::new(user_id, Uuid::new_v4()),
                JobOptions::default(),
            )
            .await
            .unwrap();
        let claimed = queue.claim_next(JobType::Clustering).await.unwrap().unwrap();
        queue
            .report_progress(&claimed, JobProgress::new(40, "clustering", "embedding"))
            .await
            .unwrap();
        queue.complete(&claimed, json!({"clusters": 3})).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel_token.cancel();
        relay.await.unwrap();

        let events = notifier.job_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], JobEvent::Active { .. }));
        assert!(matches!(events[1], JobEvent::Completed { .. }));
        assert!(events.iter().all(|event| event.job().job_id == job.id));

        let progress = notifier.notifications().into_iter().any(|notification| {
            matches!(notification, Notification::JobProgress { user_id: to, .. } if to == user_id)
        });
        assert!(progress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_notifier_does_not_stop_relay() {
        let queue = JobQueue::in_memory(QueueConfig::default());
        let notifier = Arc::new(RecordingNotifier::failing());
        let cancel_token = CancellationToken::new();
        let relay = JobEventRelay::new(&queue, notifier.clone(), cancel_token.clone()).spawn();

        for _ in 0..2 {
            queue
                .add_job(
                    JobType::ExportGeneration,
                    JobData::new(Uuid::new_v4(), Uuid::new_v4()),
                    JobOptions::default(),
                )
                .await
                .unwrap();
            queue.claim_next(JobType::ExportGeneration).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(notifier.job_events().len(), 2);
        assert!(!relay.is_finished());
        cancel_token.cancel();
    }
}
