//! Error types for remote collaborators.

use url::Url;
use uuid::Uuid;

/// Result type for remote operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for remote operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Request or response body could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The remote service answered with a non-success status.
    #[error("{url} responded with HTTP {status}: {body}")]
    Status { url: Url, status: u16, body: String },

    /// A running job was reclaimed by another execution.
    #[error("Job {job_id} is no longer owned by this worker")]
    Abandoned { job_id: Uuid },

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Reqwest(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Returns true if retrying the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reqwest(err) => err.is_timeout() || err.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_classify_retries() {
        let url = Url::parse("http://records.local/projects").unwrap();
        let unavailable = Error::Status {
            url: url.clone(),
            status: 503,
            body: String::new(),
        };
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status(), Some(503));

        let rejected = Error::Status {
            url,
            status: 422,
            body: "bad payload".into(),
        };
        assert!(!rejected.is_retryable());
        assert!(rejected.to_string().contains("HTTP 422: bad payload"));
    }
}
