#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for request handlers.
///
/// Use this target for logging workflow and queue operations triggered by
/// HTTP requests.
pub const TRACING_TARGET_HANDLER: &str = "folio_server::handler";

/// Tracing target for HTTP middleware.
pub const TRACING_TARGET_MIDDLEWARE: &str = "folio_server::middleware";

pub mod extract;
pub mod handler;
pub mod middleware;
pub mod service;

pub use crate::handler::{Error, ErrorKind, Result, routes};
pub use crate::service::ServiceState;
