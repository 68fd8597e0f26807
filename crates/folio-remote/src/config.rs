//! Remote collaborator configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Default timeout for HTTP requests: 30 seconds.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Endpoints and HTTP settings of the remote collaborators.
///
/// Every endpoint is optional; the binary falls back to in-process
/// collaborators for the ones left unset.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RemoteConfig {
    /// Base URL of the stage processing service.
    #[cfg_attr(feature = "config", arg(long = "processor-url", env = "PROCESSOR_URL"))]
    #[serde(default)]
    pub processor_url: Option<Url>,

    /// Base URL of the project records service.
    #[cfg_attr(feature = "config", arg(long = "records-url", env = "RECORDS_URL"))]
    #[serde(default)]
    pub records_url: Option<Url>,

    /// Endpoint receiving workflow and job notifications.
    #[cfg_attr(feature = "config", arg(long = "webhook-url", env = "WEBHOOK_URL"))]
    #[serde(default)]
    pub webhook_url: Option<Url>,

    /// Secret used to sign webhook payloads.
    #[cfg_attr(
        feature = "config",
        arg(long = "webhook-secret", env = "WEBHOOK_SECRET", hide_env_values = true)
    )]
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// HTTP request timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(long = "http-timeout", env = "HTTP_TIMEOUT", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)
    )]
    #[serde(default = "RemoteConfig::default_http_timeout")]
    pub http_timeout: u64,

    /// User-Agent header sent with every request.
    #[cfg_attr(feature = "config", arg(long = "http-user-agent", env = "HTTP_USER_AGENT"))]
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            processor_url: None,
            records_url: None,
            webhook_url: None,
            webhook_secret: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl RemoteConfig {
    fn default_http_timeout() -> u64 {
        DEFAULT_HTTP_TIMEOUT_SECS
    }

    /// Set the stage processing service.
    #[must_use]
    pub fn with_processor_url(mut self, url: Url) -> Self {
        self.processor_url = Some(url);
        self
    }

    /// Set the project records service.
    #[must_use]
    pub fn with_records_url(mut self, url: Url) -> Self {
        self.records_url = Some(url);
        self
    }

    /// Set the webhook endpoint and its signing secret.
    #[must_use]
    pub fn with_webhook(mut self, url: Url, secret: Option<String>) -> Self {
        self.webhook_url = Some(url);
        self.webhook_secret = secret;
        self
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout = timeout_secs;
        self
    }

    /// Returns the request timeout, using the default if zero.
    pub fn timeout(&self) -> Duration {
        match self.http_timeout {
            0 => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Returns the effective user agent, using the default if not set.
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("folio/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Validates the endpoints.
    pub fn validate(&self) -> Result<()> {
        let endpoints = [
            ("processor", &self.processor_url),
            ("records", &self.records_url),
            ("webhook", &self.webhook_url),
        ];
        for (name, url) in endpoints {
            if let Some(url) = url
                && !matches!(url.scheme(), "http" | "https")
            {
                return Err(Error::invalid_config(format!(
                    "{name} url must use http or https, got {}",
                    url.scheme()
                )));
            }
        }

        if self.webhook_secret.is_some() && self.webhook_url.is_none() {
            return Err(Error::invalid_config(
                "webhook secret is set but no webhook url",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("processor_url", &self.processor_url)
            .field("records_url", &self.records_url)
            .field("webhook_url", &self.webhook_url)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "****"))
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
