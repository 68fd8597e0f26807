//! Application state and dependency injection.

use std::sync::Arc;

use folio_queue::queue::JobQueue;
use folio_queue::worker::WorkerRegistry;
use folio_workflow::orchestrator::WorkflowOrchestrator;

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection). Handlers pull
/// the single service they need through [`FromRef`].
///
/// [`State`]: axum::extract::State
/// [`FromRef`]: axum::extract::FromRef
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    orchestrator: WorkflowOrchestrator,
    queue: JobQueue,
    workers: Arc<WorkerRegistry>,
}

impl ServiceState {
    /// Creates the state from already running services.
    pub fn new(
        orchestrator: WorkflowOrchestrator,
        queue: JobQueue,
        workers: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            workers,
        }
    }

    pub fn orchestrator(&self) -> &WorkflowOrchestrator {
        &self.orchestrator
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(orchestrator: WorkflowOrchestrator);
impl_di!(queue: JobQueue);
impl_di!(workers: Arc<WorkerRegistry>);
