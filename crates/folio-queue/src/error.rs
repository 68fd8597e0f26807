//! Error types for job queue operations.

use std::time::Duration;

use uuid::Uuid;

use crate::job::JobType;

/// Boxed error type used by pluggable collaborators.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for all queue operations in this crate.
///
/// This is a convenience type alias that defaults to using [`Error`] as the error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for job queue operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// NATS client/connection errors.
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::Error),

    /// Serialization errors when persisting or reading jobs.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timeout.
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Store operation failed.
    #[error("Job store operation '{operation}' failed: {details}")]
    Store { operation: String, details: String },

    /// Optimistic concurrency failed repeatedly for a key.
    #[error("Concurrent modification of job {job_id} in {job_type} queue")]
    Contention { job_type: JobType, job_id: Uuid },

    /// No processor is registered for a job type.
    #[error("No stage processor registered for {job_type}")]
    MissingProcessor { job_type: JobType },

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Generic operation error with context.
    #[error("Queue operation failed: {operation} - {details}")]
    Operation { operation: String, details: String },
}

impl Error {
    /// Create a store error.
    pub fn store(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Create an operation error with context.
    pub fn operation(op: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Operation {
            operation: op.into(),
            details: details.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a timeout error with the given duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { timeout: duration }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout { .. } | Error::Contention { .. }
        )
    }

    /// Get a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            Error::Connection(_) => "The job store is unreachable. Please try again.".to_string(),
            Error::Timeout { timeout } => {
                format!("Operation timed out after {:?}. Please try again.", timeout)
            }
            Error::Serialization(_) => "Stored job data is malformed.".to_string(),
            Error::InvalidConfig { reason } => format!("Configuration error: {}", reason),
            _ => "An unexpected queue error occurred. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(Error::timeout(Duration::from_secs(1)).is_transient());
        assert!(
            Error::Contention {
                job_type: JobType::Clustering,
                job_id: Uuid::nil(),
            }
            .is_transient()
        );
        assert!(!Error::store("insert", "disk full").is_transient());
    }

    #[test]
    fn test_store_error_display() {
        let err = Error::store("claim_next", "bucket missing");
        assert_eq!(
            err.to_string(),
            "Job store operation 'claim_next' failed: bucket missing"
        );
    }
}
