//! Contracts of the external collaborators the orchestrator drives.
//!
//! - [`Repositories`] - Read access to project records, plus project status writes
//! - [`Notifier`] - Best-effort fan-out of workflow and job updates
//! - [`RollbackHandler`] - Optional decision on what a stage failure undoes

mod notifier;
mod repository;
mod rollback;

pub use self::notifier::{Notifier, TracingNotifier, WorkflowProgress};
pub use self::repository::{
    ClusterRecord, ClusterRepository, ImageRecord, ImageRepository, NoteRecord, NoteRepository,
    ProjectRecord, ProjectRepository, ProjectStatus, Repositories, UploadStatus,
};
pub use self::rollback::{CheckpointRollback, RollbackHandler, RollbackPlan};
