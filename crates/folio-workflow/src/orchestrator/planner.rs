//! Work unit planning: which jobs a stage submits.

use serde_json::{Map, Value, json};

use crate::collaborator::{ClusterRecord, Repositories, UploadStatus};
use crate::workflow::{WorkflowStage, WorkflowState};
use crate::{Error, Result};

/// Type-specific payload fields of one job.
pub(crate) type WorkUnit = Map<String, Value>;

/// Returns one payload per job the stage has to submit.
///
/// An empty plan means the stage has nothing left to do, which makes
/// re-entering a partially finished workflow cheap.
pub(crate) async fn plan_stage(
    stage: WorkflowStage,
    state: &WorkflowState,
    repositories: &Repositories,
) -> Result<Vec<WorkUnit>> {
    let project_id = state.project_id;
    let config = &state.config;

    let units = match stage {
        WorkflowStage::Upload | WorkflowStage::Completed => Vec::new(),
        WorkflowStage::OcrProcessing => repositories
            .images
            .find_by_project_id(project_id)
            .await
            .map_err(|err| Error::collaborator("find images", err))?
            .into_iter()
            .filter(|image| image.upload_status == UploadStatus::Uploaded && !image.ocr_completed)
            .map(|image| unit(json!({ "image_id": image.id })))
            .collect(),
        WorkflowStage::TextCleaning => repositories
            .notes
            .find_by_project_id(project_id)
            .await
            .map_err(|err| Error::collaborator("find notes", err))?
            .into_iter()
            .filter(|note| !note.cleaned)
            .map(|note| {
                unit(json!({
                    "note_id": note.id,
                    "options": config.text_cleaning,
                }))
            })
            .collect(),
        WorkflowStage::Clustering => {
            let clusters = find_clusters(state, repositories).await?;
            let notes = repositories
                .notes
                .find_by_project_id(project_id)
                .await
                .map_err(|err| Error::collaborator("find notes", err))?;

            if !clusters.is_empty() || notes.is_empty() {
                Vec::new()
            } else {
                vec![unit(json!({
                    "method": config.clustering_method,
                    "target_clusters": config.target_clusters,
                    "note_count": notes.len(),
                }))]
            }
        }
        WorkflowStage::SummaryGeneration => {
            let pending: Vec<_> = find_clusters(state, repositories)
                .await?
                .into_iter()
                .filter(|cluster| !cluster.has_summary)
                .map(|cluster| cluster.id)
                .collect();

            if pending.is_empty() {
                Vec::new()
            } else {
                vec![unit(json!({
                    "cluster_ids": pending,
                    "include_quotes": config.summary.include_quotes,
                    "include_distribution": config.summary.include_distribution,
                    "max_themes": config.summary.max_themes,
                }))]
            }
        }
        WorkflowStage::ExportGeneration => {
            let project = repositories
                .projects
                .find_by_id(project_id)
                .await
                .map_err(|err| Error::collaborator("find project", err))?
                .ok_or_else(|| Error::infrastructure(format!("project {project_id} not found")))?;

            if project.exported_at.is_some() {
                Vec::new()
            } else {
                vec![unit(json!({ "project_name": project.name }))]
            }
        }
    };

    Ok(units
        .into_iter()
        .map(|mut unit| {
            unit.insert("auto_processing".into(), config.auto_processing.into());
            unit
        })
        .collect())
}

async fn find_clusters(
    state: &WorkflowState,
    repositories: &Repositories,
) -> Result<Vec<ClusterRecord>> {
    repositories
        .clusters
        .find_by_project_id(state.project_id)
        .await
        .map_err(|err| Error::collaborator("find clusters", err))
}

fn unit(value: Value) -> WorkUnit {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jiff::Timestamp;
    use uuid::Uuid;

    use super::*;
    use crate::mock::MemoryCatalog;
    use crate::workflow::WorkflowConfig;

    fn setup() -> (Arc<MemoryCatalog>, Repositories, WorkflowState) {
        let catalog = Arc::new(MemoryCatalog::new());
        let user_id = Uuid::new_v4();
        let project_id = catalog.add_project(user_id, "field notes");
        let state =
            WorkflowState::new(project_id, user_id, WorkflowConfig::default(), Timestamp::UNIX_EPOCH);
        (catalog.clone(), Repositories::from_catalog(catalog), state)
    }

    #[tokio::test]
    async fn test_ocr_plans_one_unit_per_unprocessed_image() {
        let (catalog, repositories, state) = setup();
        let first = catalog.add_image(state.project_id, UploadStatus::Uploaded);
        let done = catalog.add_image(state.project_id, UploadStatus::Uploaded);
        catalog.complete_ocr(done);
        catalog.add_image(state.project_id, UploadStatus::Failed);

        let units = plan_stage(WorkflowStage::OcrProcessing, &state, &repositories)
            .await
            .unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0]["image_id"], json!(first));
        assert_eq!(units[0]["auto_processing"], json!(true));
    }

    #[tokio::test]
    async fn test_clustering_skipped_when_clusters_exist() {
        let (catalog, repositories, state) = setup();
        catalog.add_note(state.project_id, None);

        let units = plan_stage(WorkflowStage::Clustering, &state, &repositories)
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0]["note_count"], json!(1));

        catalog.add_cluster(state.project_id, "pricing");
        let units = plan_stage(WorkflowStage::Clustering, &state, &repositories)
            .await
            .unwrap();
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn test_summary_lists_unsummarized_clusters() {
        let (catalog, repositories, state) = setup();
        let pending = catalog.add_cluster(state.project_id, "pricing");
        let summarized = catalog.add_cluster(state.project_id, "onboarding");
        catalog.complete_summary(summarized);

        let units = plan_stage(WorkflowStage::SummaryGeneration, &state, &repositories)
            .await
            .unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0]["cluster_ids"], json!([pending]));
    }

    #[tokio::test]
    async fn test_export_skipped_when_exported() {
        let (catalog, repositories, state) = setup();
        catalog.complete_export(state.project_id);

        let units = plan_stage(WorkflowStage::ExportGeneration, &state, &repositories)
            .await
            .unwrap();
        assert!(units.is_empty());
    }
}
