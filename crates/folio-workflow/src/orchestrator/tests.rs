use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use folio_queue::job::{JobPriority, JobStatus, JobType};
use folio_queue::queue::JobQueue;
use folio_queue::worker::{Processors, StageProcessor, WorkerRegistry, processor_fn};
use folio_queue::{BoxedError, QueueConfig};
use serde_json::{Value, json};
use uuid::Uuid;

use super::*;
use crate::collaborator::{CheckpointRollback, ProjectStatus, UploadStatus};
use crate::mock::{MemoryCatalog, RecordingNotifier, catalog_processors};
use crate::workflow::WorkflowStage;

struct Harness {
    queue: JobQueue,
    catalog: Arc<MemoryCatalog>,
    notifier: Arc<RecordingNotifier>,
    orchestrator: WorkflowOrchestrator,
    workers: WorkerRegistry,
    user_id: Uuid,
    project_id: Uuid,
}

impl Harness {
    fn new(build: impl FnOnce(Arc<MemoryCatalog>) -> Processors) -> Self {
        Self::with_config(OrchestratorConfig::default(), RecordingNotifier::new(), build)
    }

    fn with_config(
        config: OrchestratorConfig,
        notifier: RecordingNotifier,
        build: impl FnOnce(Arc<MemoryCatalog>) -> Processors,
    ) -> Self {
        let queue = JobQueue::in_memory(QueueConfig::default());
        let catalog = Arc::new(MemoryCatalog::new());
        let notifier = Arc::new(notifier);
        let user_id = Uuid::new_v4();
        let project_id = catalog.add_project(user_id, "interview notes");

        let workers = WorkerRegistry::spawn(&queue, &build(catalog.clone()));
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(queue.clone()),
            Repositories::from_catalog(catalog.clone()),
            notifier.clone(),
            config,
        )
        .with_clock(queue.clock());

        Self {
            queue,
            catalog,
            notifier,
            orchestrator,
            workers,
            user_id,
            project_id,
        }
    }

    fn with_rollback(mut self, rollback: Arc<dyn RollbackHandler>) -> Self {
        self.orchestrator = self.orchestrator.with_rollback(rollback);
        self
    }

    fn add_images(&self, count: usize, status: UploadStatus) -> Vec<Uuid> {
        (0..count)
            .map(|_| self.catalog.add_image(self.project_id, status))
            .collect()
    }

    async fn start(&self) -> Uuid {
        self.orchestrator
            .start_workflow(self.project_id, self.user_id, WorkflowConfig::default())
            .await
            .unwrap()
            .id
    }

    async fn wait_until(
        &self,
        workflow_id: Uuid,
        predicate: impl Fn(&WorkflowState) -> bool,
    ) -> WorkflowState {
        for _ in 0..4_000 {
            let state = self.orchestrator.get_status(workflow_id).unwrap();
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        panic!("workflow {workflow_id} never reached the expected state");
    }

    async fn wait_terminal(&self, workflow_id: Uuid) -> WorkflowState {
        self.wait_until(workflow_id, WorkflowState::is_terminal).await
    }
}

/// Keeps only the processors of the given job types.
fn only(processors: Processors, job_types: &[JobType]) -> Processors {
    job_types.iter().fold(Processors::new(), |kept, job_type| {
        match processors.get(*job_type) {
            Some(processor) => kept.with(*job_type, processor),
            None => kept,
        }
    })
}

fn is_non_decreasing(values: &[u8]) -> bool {
    values.windows(2).all(|pair| pair[0] <= pair[1])
}

#[tokio::test(start_paused = true)]
async fn test_full_pipeline_completes() {
    let harness = Harness::new(catalog_processors);
    harness.add_images(3, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.current_stage, WorkflowStage::Completed);
    assert_eq!(state.progress, 100);
    assert!(state.completed_at.is_some());
    assert!(state.error.is_none());

    let stages: Vec<_> = state.stage_results.keys().copied().collect();
    assert_eq!(
        stages,
        WorkflowStage::all()
            .filter(|stage| *stage != WorkflowStage::Completed)
            .collect::<Vec<_>>()
    );
    assert_eq!(state.job_ids[&WorkflowStage::OcrProcessing].len(), 3);
    assert_eq!(state.job_ids[&WorkflowStage::TextCleaning].len(), 3);
    assert_eq!(state.job_ids[&WorkflowStage::Clustering].len(), 1);
    assert_eq!(state.job_ids[&WorkflowStage::SummaryGeneration].len(), 1);
    assert_eq!(state.job_ids[&WorkflowStage::ExportGeneration].len(), 1);

    assert!(harness.catalog.notes(harness.project_id).iter().all(|note| note.cleaned));
    assert!(
        harness
            .catalog
            .clusters(harness.project_id)
            .iter()
            .all(|cluster| cluster.has_summary)
    );
    assert_eq!(
        harness.catalog.status_history(harness.project_id),
        vec![ProjectStatus::Processing, ProjectStatus::Completed]
    );

    let progress = harness.notifier.progress_of(workflow_id);
    assert!(is_non_decreasing(&progress));
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(
        harness.notifier.statuses_of(workflow_id),
        vec![WorkflowStatus::Completed]
    );

    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_stage_larger_than_retention_completes() {
    let harness = Harness::new(catalog_processors);
    harness.add_images(120, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Completed, "{:?}", state.error);
    let ocr_jobs = &state.job_ids[&WorkflowStage::OcrProcessing];
    assert_eq!(ocr_jobs.len(), 120);

    let stats = harness
        .queue
        .get_queue_stats(JobType::OcrProcessing)
        .await
        .unwrap();
    assert_eq!(stats.completed, 100);
    for job_id in ocr_jobs {
        let view = harness.queue.get_job_status(*job_id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Completed);
    }

    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_ocr_stage_submits_one_high_priority_job_per_image() {
    let harness = Harness::new(|catalog| {
        only(catalog_processors(catalog), &[JobType::OcrProcessing])
    });
    harness.add_images(3, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let state = harness
        .wait_until(workflow_id, |state| {
            state.current_stage == WorkflowStage::TextCleaning
        })
        .await;

    assert_eq!(state.status, WorkflowStatus::Running);
    assert!((20..=35).contains(&state.progress));
    assert!(state.stage_results.contains_key(&WorkflowStage::OcrProcessing));

    let ocr_jobs = &state.job_ids[&WorkflowStage::OcrProcessing];
    assert_eq!(ocr_jobs.len(), 3);
    for job_id in ocr_jobs {
        let view = harness.queue.get_job_status(*job_id).await.unwrap().unwrap();
        assert_eq!(view.job_type, JobType::OcrProcessing);
        assert_eq!(view.priority, JobPriority::High);
        assert_eq!(view.status, JobStatus::Completed);
    }

    assert!(harness.orchestrator.cancel_workflow(workflow_id).await.unwrap());
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_failed_clustering_fails_workflow() {
    let harness = Harness::new(|catalog| {
        only(
            catalog_processors(catalog),
            &[JobType::SummaryGeneration, JobType::ExportGeneration],
        )
        .with(
            JobType::Clustering,
            Arc::new(processor_fn(|_job, _progress| async {
                Err::<Value, BoxedError>("insufficient text".into())
            })),
        )
    });
    for image_id in harness.add_images(2, UploadStatus::Uploaded) {
        harness.catalog.complete_ocr(image_id);
        let note_id = harness.catalog.add_note(harness.project_id, Some(image_id));
        harness.catalog.complete_cleaning(note_id);
    }

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.current_stage, WorkflowStage::Clustering);
    assert!(state.error.as_deref().unwrap().contains("insufficient text"));
    assert!(!state.stage_results.contains_key(&WorkflowStage::Clustering));
    assert!(!state.job_ids.contains_key(&WorkflowStage::SummaryGeneration));

    let clustering_job = state.job_ids[&WorkflowStage::Clustering][0];
    let view = harness
        .queue
        .get_job_status(clustering_job)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.attempts_made, 3);

    let summary_stats = harness
        .queue
        .get_queue_stats(JobType::SummaryGeneration)
        .await
        .unwrap();
    assert_eq!(summary_stats.total(), 0);

    assert_eq!(
        harness.catalog.status_history(harness.project_id).last(),
        Some(&ProjectStatus::Failed)
    );
    assert_eq!(
        harness.notifier.statuses_of(workflow_id),
        vec![WorkflowStatus::Failed]
    );
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_removes_active_jobs() {
    let harness = Harness::new(|_catalog| {
        Processors::new().with(
            JobType::OcrProcessing,
            Arc::new(processor_fn(|_job, _progress| async {
                tokio::time::sleep(Duration::from_secs(60 * 60)).await;
                Ok::<_, BoxedError>(json!({"text": "late"}))
            })),
        )
    });
    harness.add_images(2, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let running = harness
        .wait_until(workflow_id, |state| {
            state
                .job_ids
                .get(&WorkflowStage::OcrProcessing)
                .is_some_and(|jobs| jobs.len() == 2)
        })
        .await;
    let job_ids = running.job_ids.clone();
    let ocr_jobs = job_ids[&WorkflowStage::OcrProcessing].clone();

    for _ in 0..100 {
        let stats = harness
            .queue
            .get_queue_stats(JobType::OcrProcessing)
            .await
            .unwrap();
        if stats.active == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(harness.orchestrator.cancel_workflow(workflow_id).await.unwrap());

    let state = harness.orchestrator.get_status(workflow_id).unwrap();
    assert_eq!(state.status, WorkflowStatus::Cancelled);
    assert_eq!(state.job_ids, job_ids);
    for job_id in &ocr_jobs {
        assert!(harness.queue.get_job_status(*job_id).await.unwrap().is_none());
    }

    // Let the executions finish; their results are discarded.
    tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
    let state = harness.orchestrator.get_status(workflow_id).unwrap();
    assert_eq!(state.status, WorkflowStatus::Cancelled);
    for job_id in &ocr_jobs {
        assert!(harness.queue.get_job_status(*job_id).await.unwrap().is_none());
    }

    assert!(!harness.orchestrator.cancel_workflow(workflow_id).await.unwrap());
    assert_eq!(
        harness.notifier.statuses_of(workflow_id),
        vec![WorkflowStatus::Cancelled]
    );
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_no_images_is_an_infrastructure_failure() {
    let harness = Harness::new(catalog_processors);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.current_stage, WorkflowStage::Upload);
    assert!(state.error.as_deref().unwrap().contains("no images found"));
    assert!(state.job_ids.is_empty());
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_pending_uploads() {
    let harness = Harness::new(catalog_processors);
    let images = harness.add_images(2, UploadStatus::Pending);

    let workflow_id = harness.start().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    let state = harness.orchestrator.get_status(workflow_id).unwrap();
    assert_eq!(state.status, WorkflowStatus::Running);
    assert_eq!(state.current_stage, WorkflowStage::Upload);

    harness
        .catalog
        .set_upload_status(images[0], UploadStatus::Uploaded);
    tokio::time::sleep(Duration::from_secs(10)).await;
    let state = harness.orchestrator.get_status(workflow_id).unwrap();
    assert_eq!(state.current_stage, WorkflowStage::Upload);
    assert!(state.progress > WorkflowStage::Upload.progress_band().start);

    harness
        .catalog
        .set_upload_status(images[1], UploadStatus::Uploaded);
    let state = harness.wait_terminal(workflow_id).await;
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.job_ids[&WorkflowStage::OcrProcessing].len(), 2);
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_upload_wait_times_out() {
    let harness = Harness::new(catalog_processors);
    harness.add_images(1, UploadStatus::Pending);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.error.as_deref(), Some("UPLOAD timed out after 300s"));
    assert!(state.job_ids.is_empty());
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_stage_timeout_cancels_outstanding_jobs() {
    let config = OrchestratorConfig::default().with_stage_timeout(Duration::from_secs(60));
    let harness = Harness::with_config(config, RecordingNotifier::new(), |_| Processors::new());
    harness.add_images(2, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(
        state.error.as_deref(),
        Some("OCR_PROCESSING timed out after 60s")
    );
    for job_id in &state.job_ids[&WorkflowStage::OcrProcessing] {
        assert!(harness.queue.get_job_status(*job_id).await.unwrap().is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_rollback_and_restart() {
    let failing = Arc::new(AtomicBool::new(true));
    let harness = {
        let failing = failing.clone();
        Harness::new(move |catalog| {
            let processors = catalog_processors(catalog);
            let summary = processors.get(JobType::SummaryGeneration);
            processors.with(
                JobType::SummaryGeneration,
                Arc::new(processor_fn(move |job, progress| {
                    let summary = summary.clone();
                    let failing = failing.clone();
                    async move {
                        if failing.load(Ordering::SeqCst) {
                            return Err::<Value, BoxedError>("model overloaded".into());
                        }
                        match summary {
                            Some(summary) => summary.process(&job, &progress).await,
                            None => Err("no summary processor".into()),
                        }
                    }
                })),
            )
        })
    }
    .with_rollback(Arc::new(CheckpointRollback::default()));
    harness.add_images(2, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let failed = harness.wait_terminal(workflow_id).await;

    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("model overloaded"));
    assert_eq!(failed.current_stage, WorkflowStage::Clustering);
    assert!(failed.stage_results.contains_key(&WorkflowStage::TextCleaning));
    assert!(!failed.stage_results.contains_key(&WorkflowStage::Clustering));
    assert!(!failed.job_ids.contains_key(&WorkflowStage::Clustering));
    assert!(!failed.job_ids.contains_key(&WorkflowStage::SummaryGeneration));
    assert_eq!(failed.job_ids[&WorkflowStage::OcrProcessing].len(), 2);

    failing.store(false, Ordering::SeqCst);
    let restarted = harness.orchestrator.restart_failed(workflow_id).await.unwrap();
    assert_eq!(restarted.status, WorkflowStatus::Pending);
    assert!(restarted.error.is_none());

    let state = harness.wait_terminal(workflow_id).await;
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.progress, 100);
    assert_eq!(state.job_ids[&WorkflowStage::OcrProcessing].len(), 2);
    assert!(state.stage_results.contains_key(&WorkflowStage::SummaryGeneration));
    assert_eq!(
        harness.notifier.statuses_of(workflow_id),
        vec![WorkflowStatus::Failed, WorkflowStatus::Completed]
    );
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_restart_requires_failed_workflow() {
    let harness = Harness::new(catalog_processors);
    harness.add_images(1, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;
    assert_eq!(state.status, WorkflowStatus::Completed);

    let err = harness.orchestrator.restart_failed(workflow_id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            status: WorkflowStatus::Completed,
            ..
        }
    ));

    let unknown = Uuid::new_v4();
    assert!(matches!(
        harness.orchestrator.restart_failed(unknown).await,
        Err(Error::NotFound(id)) if id == unknown
    ));
    assert!(matches!(
        harness.orchestrator.cancel_workflow(unknown).await,
        Err(Error::NotFound(_))
    ));
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_notifier_does_not_fail_workflow() {
    let harness = Harness::with_config(
        OrchestratorConfig::default(),
        RecordingNotifier::failing(),
        catalog_processors,
    );
    harness.add_images(1, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    let state = harness.wait_terminal(workflow_id).await;

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(!harness.notifier.notifications().is_empty());
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_known_project() {
    let harness = Harness::new(catalog_processors);

    let err = harness
        .orchestrator
        .start_workflow(Uuid::new_v4(), harness.user_id, WorkflowConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    harness.catalog.set_unavailable(true);
    let err = harness
        .orchestrator
        .start_workflow(harness.project_id, harness.user_id, WorkflowConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Collaborator { .. }));
    assert!(harness.orchestrator.registry().is_empty());
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_finished_workflows_are_swept_after_retention() {
    let harness = Harness::new(catalog_processors);
    harness.add_images(1, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    harness.wait_terminal(workflow_id).await;

    assert_eq!(harness.orchestrator.list_by_user(harness.user_id).len(), 1);
    assert_eq!(harness.orchestrator.list_by_project(harness.project_id).len(), 1);
    assert_eq!(harness.orchestrator.sweep(), 0);

    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
    assert_eq!(harness.orchestrator.sweep(), 1);
    assert!(harness.orchestrator.get_status(workflow_id).is_none());
    assert!(harness.orchestrator.list_by_user(harness.user_id).is_empty());
    harness.workers.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_run_tasks() {
    let harness = Harness::new(|_| Processors::new());
    harness.add_images(1, UploadStatus::Uploaded);

    let workflow_id = harness.start().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    harness.orchestrator.shutdown();
    harness.orchestrator.wait().await;

    let state = harness.orchestrator.get_status(workflow_id).unwrap();
    assert_eq!(state.status, WorkflowStatus::Running);
}
