//! Job queue error to HTTP error conversion.

use folio_queue::Error as QueueError;

use super::http_error::{Error as HttpError, ErrorKind};

impl From<QueueError> for HttpError<'static> {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::Connection(err) => ErrorKind::ServiceUnavailable
                .with_message("Job store is unreachable")
                .with_context(err.to_string()),

            QueueError::Timeout { timeout } => ErrorKind::ServiceUnavailable
                .with_message("Job store did not respond in time")
                .with_context(format!("timed out after {timeout:?}")),

            QueueError::Store { operation, details } => ErrorKind::ServiceUnavailable
                .with_message("Job store operation failed")
                .with_context(format!("{operation}: {details}")),

            QueueError::Contention { job_type, job_id } => ErrorKind::ServiceUnavailable
                .with_message("Job is being modified concurrently, try again")
                .with_resource("job")
                .with_context(format!("{job_type} job {job_id}")),

            QueueError::InvalidConfig { reason } => {
                ErrorKind::BadRequest.with_message(reason)
            }

            err @ (QueueError::Serialization(_)
            | QueueError::MissingProcessor { .. }
            | QueueError::Operation { .. }) => {
                ErrorKind::InternalServerError.with_context(err.to_string())
            }
        }
    }
}
