//! In-memory record catalog.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use folio_queue::BoxedError;
use jiff::Timestamp;
use uuid::Uuid;

use crate::collaborator::{
    ClusterRecord, ClusterRepository, ImageRecord, ImageRepository, NoteRecord, NoteRepository,
    ProjectRecord, ProjectRepository, ProjectStatus, UploadStatus,
};

#[derive(Debug, Default)]
struct CatalogData {
    projects: HashMap<Uuid, ProjectRecord>,
    images: Vec<ImageRecord>,
    notes: Vec<NoteRecord>,
    clusters: Vec<ClusterRecord>,
    status_history: Vec<(Uuid, ProjectStatus)>,
}

/// Catalog implementing every repository over in-memory records.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    data: Mutex<CatalogData>,
    unavailable: AtomicBool,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every repository call fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn add_project(&self, user_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.with_data(|data| {
            data.projects.insert(
                id,
                ProjectRecord {
                    id,
                    user_id,
                    name: name.to_string(),
                    status: ProjectStatus::Draft,
                    exported_at: None,
                },
            );
        });
        id
    }

    pub fn add_image(&self, project_id: Uuid, upload_status: UploadStatus) -> Uuid {
        let id = Uuid::new_v4();
        self.with_data(|data| {
            data.images.push(ImageRecord {
                id,
                project_id,
                upload_status,
                ocr_completed: false,
            });
        });
        id
    }

    pub fn set_upload_status(&self, image_id: Uuid, upload_status: UploadStatus) {
        self.with_data(|data| {
            if let Some(image) = data.images.iter_mut().find(|image| image.id == image_id) {
                image.upload_status = upload_status;
            }
        });
    }

    pub fn complete_ocr(&self, image_id: Uuid) {
        self.with_data(|data| {
            if let Some(image) = data.images.iter_mut().find(|image| image.id == image_id) {
                image.ocr_completed = true;
            }
        });
    }

    pub fn add_note(&self, project_id: Uuid, image_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.with_data(|data| {
            data.notes.push(NoteRecord {
                id,
                project_id,
                image_id,
                cleaned: false,
            });
        });
        id
    }

    pub fn complete_cleaning(&self, note_id: Uuid) {
        self.with_data(|data| {
            if let Some(note) = data.notes.iter_mut().find(|note| note.id == note_id) {
                note.cleaned = true;
            }
        });
    }

    pub fn add_cluster(&self, project_id: Uuid, label: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.with_data(|data| {
            data.clusters.push(ClusterRecord {
                id,
                project_id,
                label: label.to_string(),
                has_summary: false,
            });
        });
        id
    }

    pub fn complete_summary(&self, cluster_id: Uuid) {
        self.with_data(|data| {
            if let Some(cluster) = data.clusters.iter_mut().find(|c| c.id == cluster_id) {
                cluster.has_summary = true;
            }
        });
    }

    pub fn complete_export(&self, project_id: Uuid) {
        self.with_data(|data| {
            if let Some(project) = data.projects.get_mut(&project_id) {
                project.exported_at = Some(Timestamp::now());
            }
        });
    }

    pub fn project(&self, project_id: Uuid) -> Option<ProjectRecord> {
        self.with_data(|data| data.projects.get(&project_id).cloned())
    }

    pub fn notes(&self, project_id: Uuid) -> Vec<NoteRecord> {
        self.with_data(|data| {
            data.notes
                .iter()
                .filter(|note| note.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    pub fn clusters(&self, project_id: Uuid) -> Vec<ClusterRecord> {
        self.with_data(|data| {
            data.clusters
                .iter()
                .filter(|cluster| cluster.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    /// Returns every status the project was set to, in order.
    pub fn status_history(&self, project_id: Uuid) -> Vec<ProjectStatus> {
        self.with_data(|data| {
            data.status_history
                .iter()
                .filter(|(id, _)| *id == project_id)
                .map(|(_, status)| *status)
                .collect()
        })
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut CatalogData) -> R) -> R {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut data)
    }

    fn check_available(&self) -> Result<(), BoxedError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("record catalog is unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for MemoryCatalog {
    async fn find_by_id(&self, project_id: Uuid) -> Result<Option<ProjectRecord>, BoxedError> {
        self.check_available()?;
        Ok(self.project(project_id))
    }

    async fn update_status(
        &self,
        project_id: Uuid,
        status: ProjectStatus,
    ) -> Result<(), BoxedError> {
        self.check_available()?;
        self.with_data(|data| -> Result<(), BoxedError> {
            let project = data
                .projects
                .get_mut(&project_id)
                .ok_or_else(|| format!("project {project_id} not found"))?;
            project.status = status;
            data.status_history.push((project_id, status));
            Ok(())
        })
    }
}

#[async_trait]
impl ImageRepository for MemoryCatalog {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<ImageRecord>, BoxedError> {
        self.check_available()?;
        Ok(self.with_data(|data| {
            data.images
                .iter()
                .filter(|image| image.project_id == project_id)
                .cloned()
                .collect()
        }))
    }
}

#[async_trait]
impl NoteRepository for MemoryCatalog {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<NoteRecord>, BoxedError> {
        self.check_available()?;
        Ok(self.notes(project_id))
    }
}

#[async_trait]
impl ClusterRepository for MemoryCatalog {
    async fn find_by_project_id(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ClusterRecord>, BoxedError> {
        self.check_available()?;
        Ok(self.clusters(project_id))
    }
}
