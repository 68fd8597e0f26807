//! Stage processor delegating jobs to an HTTP service.
//!
//! Every job is POSTed to `{base}/{queue_name}` and the JSON response body
//! becomes the job result. A non-success status fails the attempt, leaving
//! retries to the queue.

use std::sync::Arc;

use async_trait::async_trait;
use folio_queue::BoxedError;
use folio_queue::job::{Job, JobData, JobProgress, JobType};
use folio_queue::worker::{Processors, ProgressReporter, StageProcessor};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::client::endpoint;
use crate::{Error, RemoteClient, Result, TRACING_TARGET_PROCESSOR};

/// Body sent to the stage service.
#[derive(Debug, Serialize)]
struct ProcessRequest<'a> {
    job_id: Uuid,
    job_type: JobType,
    attempt: u32,
    max_attempts: u32,
    data: &'a JobData,
}

/// Runs jobs of every type on a remote stage service.
#[derive(Debug, Clone)]
pub struct HttpStageProcessor {
    client: RemoteClient,
    base_url: Url,
}

impl HttpStageProcessor {
    /// Creates a processor posting to `base_url`.
    pub fn new(client: RemoteClient, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Returns the endpoint handling jobs of `job_type`.
    pub fn endpoint(&self, job_type: JobType) -> Result<Url> {
        endpoint(&self.base_url, &[job_type.queue_name()])
    }

    /// Registers this processor for every job type.
    pub fn into_processors(self) -> Processors {
        Processors::new().with_all(Arc::new(self))
    }

    async fn dispatch(&self, job: &Job, progress: &ProgressReporter) -> Result<Value> {
        let url = self.endpoint(job.job_type)?;

        let dispatched = JobProgress::new(5, job.job_type.queue_name(), "Dispatched to stage service");
        if !progress.report(dispatched).await {
            return Err(Error::Abandoned { job_id: job.id });
        }

        tracing::debug!(
            target: TRACING_TARGET_PROCESSOR,
            job_id = %job.id,
            job_type = %job.job_type,
            url = %url,
            "Dispatching job"
        );

        let body = ProcessRequest {
            job_id: job.id,
            job_type: job.job_type,
            attempt: job.attempts_made,
            max_attempts: job.max_attempts,
            data: &job.data,
        };
        let result = self.client.send_json(Method::POST, url, &body).await?;

        tracing::debug!(
            target: TRACING_TARGET_PROCESSOR,
            job_id = %job.id,
            "Stage service accepted job"
        );
        Ok(result)
    }
}

#[async_trait]
impl StageProcessor for HttpStageProcessor {
    async fn process(&self, job: &Job, progress: &ProgressReporter) -> Result<Value, BoxedError> {
        self.dispatch(job, progress).await.map_err(|err| {
            tracing::warn!(
                target: TRACING_TARGET_PROCESSOR,
                job_id = %job.id,
                job_type = %job.job_type,
                retryable = err.is_retryable(),
                error = %err,
                "Stage service call failed"
            );
            err.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use folio_queue::QueueConfig;
    use folio_queue::job::{JobOptions, JobStatus};
    use folio_queue::queue::{JobQueue, JobView};
    use folio_queue::worker::WorkerRegistry;
    use serde_json::json;

    use super::*;
    use crate::RemoteConfig;
    use crate::test_util::serve;

    async fn wait_finished(queue: &JobQueue, job_id: Uuid) -> JobView {
        for _ in 0..200 {
            if let Some(view) = queue.get_job_status(job_id).await.unwrap()
                && matches!(view.status, JobStatus::Completed | JobStatus::Failed)
            {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {job_id} never finished");
    }

    fn processor(base_url: Url) -> HttpStageProcessor {
        let client = RemoteClient::new(RemoteConfig::default().with_timeout(5)).unwrap();
        HttpStageProcessor::new(client, base_url)
    }

    #[test]
    fn test_endpoint_per_job_type() {
        let processor = processor(Url::parse("http://stages.local/v1/").unwrap());
        let url = processor.endpoint(JobType::SummaryGeneration).unwrap();
        assert_eq!(url.as_str(), "http://stages.local/v1/summary_generation");
    }

    #[tokio::test]
    async fn test_response_body_becomes_job_result() {
        let router = Router::new().route(
            "/ocr_processing",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "text": "meeting notes",
                    "image_id": body["data"]["image_id"],
                }))
            }),
        );
        let base_url = serve(router).await;

        let queue = JobQueue::in_memory(QueueConfig::default());
        let workers = WorkerRegistry::spawn(&queue, &processor(base_url).into_processors());

        let data = JobData::new(Uuid::new_v4(), Uuid::new_v4()).with_field("image_id", "img-1");
        let job = queue
            .add_job(JobType::OcrProcessing, data, JobOptions::default())
            .await
            .unwrap();

        let view = wait_finished(&queue, job.id).await;
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(
            view.result,
            Some(json!({"text": "meeting notes", "image_id": "img-1"}))
        );
        workers.shutdown();
    }

    #[tokio::test]
    async fn test_error_status_fails_attempt() {
        let router = Router::new().route(
            "/clustering",
            post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "insufficient text") }),
        );
        let base_url = serve(router).await;

        let queue = JobQueue::in_memory(QueueConfig::default().with_max_attempts(1));
        let workers = WorkerRegistry::spawn(&queue, &processor(base_url).into_processors());

        let data = JobData::new(Uuid::new_v4(), Uuid::new_v4());
        let job = queue
            .add_job(JobType::Clustering, data, JobOptions::default())
            .await
            .unwrap();

        let view = wait_finished(&queue, job.id).await;
        assert_eq!(view.status, JobStatus::Failed);
        let reason = view.failed_reason.unwrap();
        assert!(reason.contains("HTTP 422"));
        assert!(reason.contains("insufficient text"));
        workers.shutdown();
    }
}
