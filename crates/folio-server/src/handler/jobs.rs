//! Job status, cancellation and listing handlers.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use folio_queue::queue::{JobQueue, JobView};

use super::request::{JobPathParams, ListQuery, ProjectPathParams, UserPathParams};
use super::response::{JobCancelled, Jobs};
use crate::extract::{Json, Path, Query};
use crate::handler::{ErrorKind, Result};
use crate::service::ServiceState;
use crate::TRACING_TARGET_HANDLER;

/// Returns the merged status view of a job.
#[tracing::instrument(skip_all, fields(job_id = %path_params.job_id))]
async fn get_job(
    State(queue): State<JobQueue>,
    Path(path_params): Path<JobPathParams>,
) -> Result<(StatusCode, Json<JobView>)> {
    let view = queue
        .get_job_status(path_params.job_id)
        .await?
        .ok_or_else(|| {
            ErrorKind::NotFound
                .with_message("Job not found")
                .with_resource("job")
        })?;

    Ok((StatusCode::OK, Json(view)))
}

/// Cancels a job that has not finished.
#[tracing::instrument(skip_all, fields(job_id = %path_params.job_id))]
async fn cancel_job(
    State(queue): State<JobQueue>,
    Path(path_params): Path<JobPathParams>,
) -> Result<(StatusCode, Json<JobCancelled>)> {
    let job_id = path_params.job_id;
    let cancelled = queue.cancel_job(job_id).await?;

    tracing::info!(
        target: TRACING_TARGET_HANDLER,
        job_id = %job_id,
        cancelled,
        "Job cancellation requested"
    );

    Ok((StatusCode::OK, Json(JobCancelled { job_id, cancelled })))
}

/// Lists the jobs submitted on behalf of a user.
async fn list_user_jobs(
    State(queue): State<JobQueue>,
    Path(path_params): Path<UserPathParams>,
    Query(query): Query<ListQuery>,
) -> Result<(StatusCode, Json<Jobs>)> {
    let jobs = queue
        .get_user_jobs(path_params.user_id, query.limit())
        .await?;
    Ok((StatusCode::OK, Json(Jobs { jobs })))
}

/// Lists the jobs submitted for a project.
async fn list_project_jobs(
    State(queue): State<JobQueue>,
    Path(path_params): Path<ProjectPathParams>,
    Query(query): Query<ListQuery>,
) -> Result<(StatusCode, Json<Jobs>)> {
    let jobs = queue
        .get_project_jobs(path_params.project_id, query.limit())
        .await?;
    Ok((StatusCode::OK, Json(Jobs { jobs })))
}

/// Returns a [`Router`] with all job routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/jobs/{job_id}", get(get_job).delete(cancel_job))
        .route("/users/{user_id}/jobs", get(list_user_jobs))
        .route("/projects/{project_id}/jobs", get(list_project_jobs))
}

#[cfg(test)]
mod tests {
    use folio_queue::job::{JobData, JobOptions, JobStatus, JobType};
    use uuid::Uuid;

    use super::*;
    use crate::handler::test::TestContext;

    async fn add_job(context: &TestContext, job_type: JobType) -> Uuid {
        let data = JobData::new(context.user_id, context.project_id).with_field("image_id", "a");
        context
            .queue
            .add_job(job_type, data, JobOptions::default())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn waiting_job_is_visible() -> anyhow::Result<()> {
        let context = TestContext::new()?;
        let job_id = add_job(&context, JobType::OcrProcessing).await;

        let response = context.server.get(&format!("/jobs/{job_id}")).await;
        response.assert_status_ok();
        let view: JobView = response.json();
        assert_eq!(view.id, job_id);
        assert_eq!(view.status, JobStatus::Waiting);
        assert_eq!(view.job_type, JobType::OcrProcessing);
        assert_eq!(
            view.data.field("image_id"),
            Some(&serde_json::Value::from("a"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_job_disappears() -> anyhow::Result<()> {
        let context = TestContext::new()?;
        let job_id = add_job(&context, JobType::Clustering).await;

        let response = context.server.delete(&format!("/jobs/{job_id}")).await;
        response.assert_status_ok();
        let cancelled: JobCancelled = response.json();
        assert!(cancelled.cancelled);

        let response = context.server.get(&format!("/jobs/{job_id}")).await;
        response.assert_status_not_found();

        let response = context.server.delete(&format!("/jobs/{job_id}")).await;
        let cancelled: JobCancelled = response.json();
        assert!(!cancelled.cancelled);
        Ok(())
    }

    #[tokio::test]
    async fn listings_respect_limit() -> anyhow::Result<()> {
        let context = TestContext::new()?;
        for _ in 0..3 {
            add_job(&context, JobType::TextCleaning).await;
        }

        let response = context
            .server
            .get(&format!("/users/{}/jobs", context.user_id))
            .await;
        response.assert_status_ok();
        let jobs: Jobs = response.json();
        assert_eq!(jobs.jobs.len(), 3);

        let response = context
            .server
            .get(&format!("/projects/{}/jobs", context.project_id))
            .add_query_param("limit", 2)
            .await;
        let jobs: Jobs = response.json();
        assert_eq!(jobs.jobs.len(), 2);
        assert!(jobs.jobs.iter().all(|job| job.project_id == context.project_id));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_limit_is_bad_request() -> anyhow::Result<()> {
        let context = TestContext::new()?;

        let response = context
            .server
            .get(&format!("/users/{}/jobs", context.user_id))
            .add_query_param("limit", "many")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        Ok(())
    }
}
