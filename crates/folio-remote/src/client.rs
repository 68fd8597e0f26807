//! Shared HTTP client of the remote collaborators.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{Error, RemoteConfig, Result};

/// Longest response body kept in a status error.
const MAX_ERROR_BODY_CHARS: usize = 1024;

struct RemoteClientInner {
    http: Client,
    config: RemoteConfig,
}

/// HTTP client shared by the stage processor, catalog and notifier.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.effective_user_agent())
            .build()?;

        Ok(Self {
            inner: Arc::new(RemoteClientInner { http, config }),
        })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.inner.config
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner.http.request(method, url)
    }

    /// Fetches a JSON document; a 404 yields `None`.
    pub(crate) async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    /// Fetches a JSON document that must exist.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.request(Method::GET, url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Sends a JSON body and returns the JSON response, `null` if empty.
    pub(crate) async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<serde_json::Value> {
        let response = self.request(method, url).json(body).send().await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Turns a non-success response into [`Error::Status`].
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map(|body| body.chars().take(MAX_ERROR_BODY_CHARS).collect())
        .unwrap_or_default();

    Err(Error::Status {
        url,
        status: status.as_u16(),
        body,
    })
}

/// Appends path segments to a base URL.
///
/// Unlike [`Url::join`], the last segment of the base is kept whether or not
/// it ends with a slash.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::invalid_config(format!("{base} cannot be used as a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
