//! Record repositories consulted to plan each stage.

use std::sync::Arc;

use async_trait::async_trait;
use folio_queue::BoxedError;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Overall processing status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    /// When the project's document was last exported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<Timestamp>,
}

/// Upload state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub upload_status: UploadStatus,
    /// Whether text was already extracted from the image.
    #[serde(default)]
    pub ocr_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Image the note was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<Uuid>,
    #[serde(default)]
    pub cleaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: String,
    #[serde(default)]
    pub has_summary: bool,
}

/// Project lookups and status updates.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_id(&self, project_id: Uuid) -> Result<Option<ProjectRecord>, BoxedError>;

    /// Records the overall processing status of a project.
    async fn update_status(&self, project_id: Uuid, status: ProjectStatus)
    -> Result<(), BoxedError>;
}

#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<ImageRecord>, BoxedError>;
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<NoteRecord>, BoxedError>;
}

#[async_trait]
pub trait ClusterRepository: Send + Sync {
    async fn find_by_project_id(&self, project_id: Uuid)
    -> Result<Vec<ClusterRecord>, BoxedError>;
}

/// Repositories the orchestrator reads from.
#[derive(Clone)]
pub struct Repositories {
    pub projects: Arc<dyn ProjectRepository>,
    pub images: Arc<dyn ImageRepository>,
    pub notes: Arc<dyn NoteRepository>,
    pub clusters: Arc<dyn ClusterRepository>,
}

impl Repositories {
    /// Uses one catalog implementing every repository.
    pub fn from_catalog<T>(catalog: Arc<T>) -> Self
    where
        T: ProjectRepository + ImageRepository + NoteRepository + ClusterRepository + 'static,
    {
        Self {
            projects: catalog.clone(),
            images: catalog.clone(),
            notes: catalog.clone(),
            clusters: catalog,
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
