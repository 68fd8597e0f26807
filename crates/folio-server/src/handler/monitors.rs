//! Liveness and worker monitoring handlers.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use folio_queue::worker::WorkerRegistry;
use folio_workflow::orchestrator::WorkflowOrchestrator;
use jiff::Timestamp;

use super::response::{AllWorkerStats, Health};
use crate::extract::Json;
use crate::handler::Result;
use crate::service::ServiceState;
use crate::TRACING_TARGET_HANDLER;

/// Reports whether every worker pool is still running.
async fn health_status(
    State(workers): State<Arc<WorkerRegistry>>,
    State(orchestrator): State<WorkflowOrchestrator>,
) -> Result<(StatusCode, Json<Health>)> {
    let workers_running = workers.all_running();
    let response = Health {
        healthy: workers_running,
        workers_running,
        workflows: orchestrator.registry().len(),
        checked_at: Timestamp::now(),
    };

    let status_code = if response.healthy {
        StatusCode::OK
    } else {
        tracing::warn!(
            target: TRACING_TARGET_HANDLER,
            "Health check failed, a worker pool has stopped"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((status_code, Json(response)))
}

/// Returns the statistics of every worker pool.
async fn worker_stats(
    State(workers): State<Arc<WorkerRegistry>>,
) -> Result<(StatusCode, Json<AllWorkerStats>)> {
    let workers = workers.stats();
    Ok((StatusCode::OK, Json(AllWorkerStats { workers })))
}

/// Returns a [`Router`] with all monitoring routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/health", get(health_status))
        .route("/workers/stats", get(worker_stats))
}
