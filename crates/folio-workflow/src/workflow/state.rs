//! Per-run workflow state.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{WorkflowConfig, WorkflowStage};

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Returns true for completed, failed and cancelled runs.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// State of one workflow run.
///
/// Mutated only by the task driving the run, and by cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub status: WorkflowStatus,
    pub current_stage: WorkflowStage,
    /// Overall progress; never decreases while running.
    pub progress: u8,
    pub started_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub config: WorkflowConfig,
    /// Summary of what each finished stage produced.
    #[serde(default)]
    pub stage_results: BTreeMap<WorkflowStage, serde_json::Value>,
    /// Jobs submitted by each stage.
    #[serde(default)]
    pub job_ids: BTreeMap<WorkflowStage, Vec<Uuid>>,
}

impl WorkflowState {
    /// Creates a pending workflow for a project.
    pub fn new(project_id: Uuid, user_id: Uuid, config: WorkflowConfig, now: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7(),
            project_id,
            user_id,
            status: WorkflowStatus::Pending,
            current_stage: WorkflowStage::Upload,
            progress: 0,
            started_at: now,
            completed_at: None,
            error: None,
            config,
            stage_results: BTreeMap::new(),
            job_ids: BTreeMap::new(),
        }
    }

    /// Returns true once the workflow reached a terminal status.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Raises progress to `progress`; lower values are ignored.
    ///
    /// Returns true if the value changed.
    pub fn raise_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    /// Records a finished stage and moves to the next one.
    pub fn advance(&mut self, stage: WorkflowStage, result: serde_json::Value) {
        self.stage_results.insert(stage, result);
        self.raise_progress(stage.progress_band().end);
        if let Some(next) = stage.next() {
            self.current_stage = next;
        }
    }

    /// Drops results and job ids of `stage` and every later stage.
    pub fn clear_from(&mut self, stage: WorkflowStage) {
        self.stage_results.retain(|recorded, _| *recorded < stage);
        self.job_ids.retain(|recorded, _| *recorded < stage);
    }

    /// Returns every job id submitted so far, in stage order.
    pub fn all_job_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.job_ids.values().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn state() -> WorkflowState {
        WorkflowState::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            WorkflowConfig::default(),
            Timestamp::UNIX_EPOCH,
        )
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut state = state();
        assert!(state.raise_progress(30));
        assert!(!state.raise_progress(10));
        assert_eq!(state.progress, 30);
        assert!(state.raise_progress(250));
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn test_advance_records_result() {
        let mut state = state();
        state.advance(WorkflowStage::Upload, json!({"images": 3}));

        assert_eq!(state.current_stage, WorkflowStage::OcrProcessing);
        assert_eq!(state.progress, 20);
        assert_eq!(state.stage_results[&WorkflowStage::Upload]["images"], 3);
    }

    #[test]
    fn test_clear_from_keeps_earlier_stages() {
        let mut state = state();
        let ocr = Uuid::new_v4();
        let clustering = Uuid::new_v4();
        state.job_ids.insert(WorkflowStage::OcrProcessing, vec![ocr]);
        state.job_ids.insert(WorkflowStage::Clustering, vec![clustering]);
        state.stage_results.insert(WorkflowStage::Clustering, json!({}));

        state.clear_from(WorkflowStage::Clustering);

        assert_eq!(state.all_job_ids().collect::<Vec<_>>(), vec![ocr]);
        assert!(state.stage_results.is_empty());
    }

    #[test]
    fn test_serializes_stage_keys_by_name() {
        let mut state = state();
        state.job_ids.insert(WorkflowStage::TextCleaning, vec![Uuid::nil()]);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["current_stage"], "UPLOAD");
        assert!(json["job_ids"]["TEXT_CLEANING"].is_array());
    }
}
