//! [`Error`], [`ErrorKind`] and [`Result`].

mod http_error;
mod queue_error;
mod workflow_error;

pub use http_error::{Error, ErrorKind, Result};
