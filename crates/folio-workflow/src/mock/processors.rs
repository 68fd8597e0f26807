//! Stage processors simulating their effects on a catalog.

use std::sync::Arc;

use folio_queue::BoxedError;
use folio_queue::job::{Job, JobProgress, JobType};
use folio_queue::worker::{Processors, ProgressReporter, processor_fn};
use serde_json::{Value, json};
use uuid::Uuid;

use super::MemoryCatalog;

/// Builds processors for every job type that apply the job's effect to
/// `catalog`: OCR extracts one note per image, cleaning marks notes
/// cleaned, clustering creates clusters, summary generation marks them
/// summarized and export generation marks the project exported.
pub fn catalog_processors(catalog: Arc<MemoryCatalog>) -> Processors {
    let mut processors = Processors::new();
    for job_type in JobType::all() {
        let catalog = catalog.clone();
        let processor = processor_fn(move |job: Job, progress: ProgressReporter| {
            let catalog = catalog.clone();
            async move { apply(&catalog, &job, &progress).await }
        });
        processors = processors.with(job_type, Arc::new(processor));
    }
    processors
}

async fn apply(
    catalog: &MemoryCatalog,
    job: &Job,
    progress: &ProgressReporter,
) -> Result<Value, BoxedError> {
    let project_id = job.data.project_id;
    progress
        .report(JobProgress::new(50, job.job_type.queue_name(), "working"))
        .await;

    match job.job_type {
        JobType::OcrProcessing => {
            let image_id = uuid_field(job, "image_id")?;
            catalog.complete_ocr(image_id);
            let note_id = catalog.add_note(project_id, Some(image_id));
            Ok(json!({ "image_id": image_id, "note_id": note_id }))
        }
        JobType::TextCleaning => {
            let note_id = uuid_field(job, "note_id")?;
            catalog.complete_cleaning(note_id);
            Ok(json!({ "note_id": note_id }))
        }
        JobType::Clustering => {
            let target = job
                .data
                .field("target_clusters")
                .and_then(Value::as_u64)
                .unwrap_or(2);
            let cluster_ids: Vec<_> = (1..=target)
                .map(|n| catalog.add_cluster(project_id, &format!("theme {n}")))
                .collect();
            Ok(json!({ "cluster_ids": cluster_ids }))
        }
        JobType::SummaryGeneration => {
            let cluster_ids = job
                .data
                .field("cluster_ids")
                .and_then(Value::as_array)
                .ok_or("missing cluster_ids")?;
            for cluster_id in cluster_ids {
                let cluster_id = cluster_id
                    .as_str()
                    .and_then(|id| Uuid::parse_str(id).ok())
                    .ok_or("malformed cluster id")?;
                catalog.complete_summary(cluster_id);
            }
            Ok(json!({ "summarized": cluster_ids.len() }))
        }
        JobType::ExportGeneration => {
            catalog.complete_export(project_id);
            Ok(json!({ "format": "pdf" }))
        }
    }
}

fn uuid_field(job: &Job, key: &str) -> Result<Uuid, BoxedError> {
    let value = job
        .data
        .field(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing {key}"))?;
    Ok(Uuid::parse_str(value)?)
}
