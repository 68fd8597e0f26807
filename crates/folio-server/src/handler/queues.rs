//! Queue statistics and administration handlers.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use folio_queue::queue::{JobQueue, QueueStats};

use super::request::{CleanQuery, QueuePathParams};
use super::response::{AllQueueStats, QueueCleaned, QueueState};
use crate::extract::{Json, Path, Query};
use crate::handler::Result;
use crate::service::ServiceState;
use crate::TRACING_TARGET_HANDLER;

/// Returns the statistics of every queue.
async fn all_queue_stats(State(queue): State<JobQueue>) -> Result<(StatusCode, Json<AllQueueStats>)> {
    let queues = queue.get_all_queue_stats().await?;
    Ok((StatusCode::OK, Json(AllQueueStats { queues })))
}

/// Returns the statistics of one queue.
async fn queue_stats(
    State(queue): State<JobQueue>,
    Path(path_params): Path<QueuePathParams>,
) -> Result<(StatusCode, Json<QueueStats>)> {
    let job_type = path_params.job_type()?;
    let stats = queue.get_queue_stats(job_type).await?;
    Ok((StatusCode::OK, Json(stats)))
}

/// Stops dispatching jobs of a queue; enqueues are still accepted.
#[tracing::instrument(skip_all, fields(queue = %path_params.queue))]
async fn pause_queue(
    State(queue): State<JobQueue>,
    Path(path_params): Path<QueuePathParams>,
) -> Result<(StatusCode, Json<QueueState>)> {
    let job_type = path_params.job_type()?;
    queue.pause_queue(job_type).await?;

    tracing::info!(target: TRACING_TARGET_HANDLER, job_type = %job_type, "Queue paused");
    let response = QueueState {
        job_type,
        is_paused: true,
    };
    Ok((StatusCode::OK, Json(response)))
}

/// Resumes dispatching jobs of a queue.
#[tracing::instrument(skip_all, fields(queue = %path_params.queue))]
async fn resume_queue(
    State(queue): State<JobQueue>,
    Path(path_params): Path<QueuePathParams>,
) -> Result<(StatusCode, Json<QueueState>)> {
    let job_type = path_params.job_type()?;
    queue.resume_queue(job_type).await?;

    tracing::info!(target: TRACING_TARGET_HANDLER, job_type = %job_type, "Queue resumed");
    let response = QueueState {
        job_type,
        is_paused: false,
    };
    Ok((StatusCode::OK, Json(response)))
}

/// Removes finished jobs older than the grace period.
#[tracing::instrument(skip_all, fields(queue = %path_params.queue))]
async fn clean_queue(
    State(queue): State<JobQueue>,
    Path(path_params): Path<QueuePathParams>,
    Query(query): Query<CleanQuery>,
) -> Result<(StatusCode, Json<QueueCleaned>)> {
    let job_type = path_params.job_type()?;
    let removed = queue.clean_queue(job_type, query.grace()).await?;

    tracing::info!(
        target: TRACING_TARGET_HANDLER,
        job_type = %job_type,
        removed,
        "Queue cleaned"
    );

    Ok((StatusCode::OK, Json(QueueCleaned { job_type, removed })))
}

/// Returns a [`Router`] with all queue routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/queues/stats", get(all_queue_stats))
        .route("/queues/{queue}/stats", get(queue_stats))
        .route("/queues/{queue}/pause", post(pause_queue))
        .route("/queues/{queue}/resume", post(resume_queue))
        .route("/queues/{queue}/clean", post(clean_queue))
}
