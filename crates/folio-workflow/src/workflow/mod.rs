//! Workflow model: stages, per-run state and caller-supplied options.

mod options;
mod stage;
mod state;

pub use self::options::{ClusteringMethod, SummaryOptions, TextCleaningOptions, WorkflowConfig};
pub use self::stage::{ProgressBand, WorkflowStage};
pub use self::state::{WorkflowState, WorkflowStatus};
