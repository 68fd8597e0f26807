//! Workflow lifecycle handlers.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use folio_workflow::orchestrator::WorkflowOrchestrator;
use folio_workflow::workflow::WorkflowState;

use super::request::{ProjectPathParams, StartWorkflow, UserPathParams, WorkflowPathParams};
use super::response::{WorkflowCancelled, Workflows};
use crate::extract::{Json, Path};
use crate::handler::{ErrorKind, Result};
use crate::service::ServiceState;
use crate::TRACING_TARGET_HANDLER;

/// Starts a workflow for a project.
#[tracing::instrument(skip_all)]
async fn start_workflow(
    State(orchestrator): State<WorkflowOrchestrator>,
    Json(request): Json<StartWorkflow>,
) -> Result<(StatusCode, Json<WorkflowState>)> {
    tracing::debug!(
        target: TRACING_TARGET_HANDLER,
        project_id = %request.project_id,
        user_id = %request.user_id,
        "Starting workflow"
    );

    let state = orchestrator
        .start_workflow(request.project_id, request.user_id, request.config)
        .await?;

    tracing::info!(
        target: TRACING_TARGET_HANDLER,
        workflow_id = %state.id,
        project_id = %state.project_id,
        "Workflow started"
    );

    Ok((StatusCode::CREATED, Json(state)))
}

/// Returns the current state of a workflow.
#[tracing::instrument(skip_all, fields(workflow_id = %path_params.workflow_id))]
async fn get_workflow(
    State(orchestrator): State<WorkflowOrchestrator>,
    Path(path_params): Path<WorkflowPathParams>,
) -> Result<(StatusCode, Json<WorkflowState>)> {
    let state = orchestrator
        .get_status(path_params.workflow_id)
        .ok_or_else(|| {
            ErrorKind::NotFound
                .with_message("Workflow not found")
                .with_resource("workflow")
        })?;

    Ok((StatusCode::OK, Json(state)))
}

/// Cancels a workflow and its outstanding jobs.
#[tracing::instrument(skip_all, fields(workflow_id = %path_params.workflow_id))]
async fn cancel_workflow(
    State(orchestrator): State<WorkflowOrchestrator>,
    Path(path_params): Path<WorkflowPathParams>,
) -> Result<(StatusCode, Json<WorkflowCancelled>)> {
    let workflow_id = path_params.workflow_id;
    let cancelled = orchestrator.cancel_workflow(workflow_id).await?;

    tracing::info!(
        target: TRACING_TARGET_HANDLER,
        workflow_id = %workflow_id,
        cancelled,
        "Workflow cancellation requested"
    );

    let response = WorkflowCancelled {
        workflow_id,
        cancelled,
    };
    Ok((StatusCode::OK, Json(response)))
}

/// Resumes a failed workflow from the stage it stopped at.
#[tracing::instrument(skip_all, fields(workflow_id = %path_params.workflow_id))]
async fn restart_workflow(
    State(orchestrator): State<WorkflowOrchestrator>,
    Path(path_params): Path<WorkflowPathParams>,
) -> Result<(StatusCode, Json<WorkflowState>)> {
    let state = orchestrator.restart_failed(path_params.workflow_id).await?;

    tracing::info!(
        target: TRACING_TARGET_HANDLER,
        workflow_id = %state.id,
        stage = %state.current_stage,
        "Workflow restarted"
    );

    Ok((StatusCode::ACCEPTED, Json(state)))
}

/// Lists the workflows of a user, newest first.
async fn list_user_workflows(
    State(orchestrator): State<WorkflowOrchestrator>,
    Path(path_params): Path<UserPathParams>,
) -> Result<(StatusCode, Json<Workflows>)> {
    let workflows = orchestrator.list_by_user(path_params.user_id);
    Ok((StatusCode::OK, Json(Workflows { workflows })))
}

/// Lists the workflows of a project, newest first.
async fn list_project_workflows(
    State(orchestrator): State<WorkflowOrchestrator>,
    Path(path_params): Path<ProjectPathParams>,
) -> Result<(StatusCode, Json<Workflows>)> {
    let workflows = orchestrator.list_by_project(path_params.project_id);
    Ok((StatusCode::OK, Json(Workflows { workflows })))
}

/// Returns a [`Router`] with all workflow routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/workflows", post(start_workflow))
        .route("/workflows/{workflow_id}", get(get_workflow))
        .route("/workflows/{workflow_id}/cancel", post(cancel_workflow))
        .route("/workflows/{workflow_id}/restart", post(restart_workflow))
        .route("/users/{user_id}/workflows", get(list_user_workflows))
        .route("/projects/{project_id}/workflows", get(list_project_workflows))
}
