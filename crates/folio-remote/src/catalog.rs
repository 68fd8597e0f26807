//! Record repositories backed by a project records service.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | find project | `GET {base}/projects/{id}` |
//! | update project status | `PUT {base}/projects/{id}/status` |
//! | list images | `GET {base}/projects/{id}/images` |
//! | list notes | `GET {base}/projects/{id}/notes` |
//! | list clusters | `GET {base}/projects/{id}/clusters` |

use async_trait::async_trait;
use folio_workflow::BoxedError;
use folio_workflow::collaborator::{
    ClusterRecord, ClusterRepository, ImageRecord, ImageRepository, NoteRecord, NoteRepository,
    ProjectRecord, ProjectRepository, ProjectStatus,
};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use crate::client::endpoint;
use crate::{RemoteClient, Result, TRACING_TARGET_CATALOG};

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: ProjectStatus,
}

/// HTTP client of the project records service.
///
/// Implements every repository the orchestrator consults, so one instance
/// can back all of them through
/// [`Repositories::from_catalog`](folio_workflow::collaborator::Repositories::from_catalog).
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: RemoteClient,
    base_url: Url,
}

impl HttpCatalog {
    /// Creates a catalog reading from `base_url`.
    pub fn new(client: RemoteClient, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn project_url(&self, project_id: Uuid, resource: Option<&str>) -> Result<Url> {
        let id = project_id.to_string();
        match resource {
            Some(resource) => endpoint(&self.base_url, &["projects", &id, resource]),
            None => endpoint(&self.base_url, &["projects", &id]),
        }
    }

    async fn list<T: DeserializeOwned>(&self, project_id: Uuid, resource: &str) -> Result<Vec<T>> {
        let url = self.project_url(project_id, Some(resource))?;
        let records: Vec<T> = self.client.get(url).await?;

        tracing::debug!(
            target: TRACING_TARGET_CATALOG,
            project_id = %project_id,
            resource,
            count = records.len(),
            "Fetched project records"
        );
        Ok(records)
    }
}

#[async_trait]
impl ProjectRepository for HttpCatalog {
    async fn find_by_id(&self, project_id: Uuid) -> Result<Option<ProjectRecord>, BoxedError> {
        let url = self.project_url(project_id, None)?;
        Ok(self.client.get_optional(url).await?)
    }

    async fn update_status(&self, project_id: Uuid, status: ProjectStatus) -> Result<(), BoxedError> {
        let url = self.project_url(project_id, Some("status"))?;
        self.client
            .send_json(Method::PUT, url, &StatusUpdate { status })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_CATALOG,
            project_id = %project_id,
            status = %status,
            "Project status updated"
        );
        Ok(())
    }
}

#[async_trait]
impl ImageRepository for HttpCatalog {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<ImageRecord>, BoxedError> {
        Ok(self.list(project_id, "images").await?)
    }
}

#[async_trait]
impl NoteRepository for HttpCatalog {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<NoteRecord>, BoxedError> {
        Ok(self.list(project_id, "notes").await?)
    }
}

#[async_trait]
impl ClusterRepository for HttpCatalog {
    async fn find_by_project_id(&self, project_id: Uuid) -> Result<Vec<ClusterRecord>, BoxedError> {
        Ok(self.list(project_id, "clusters").await?)
    }
}
