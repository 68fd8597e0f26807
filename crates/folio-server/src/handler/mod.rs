//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use folio_server::middleware::{RecoveryConfig, RouterObservabilityExt, RouterRecoveryExt};
//! use folio_server::{ServiceState, routes};
//!
//! fn app(state: ServiceState) -> axum::Router {
//!     routes()
//!         .with_recovery(&RecoveryConfig::default())
//!         .with_request_logging()
//!         .with_observability()
//!         .with_state(state)
//! }
//! ```
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod error;
mod jobs;
mod monitors;
mod queues;
pub mod request;
pub mod response;
mod workflows;

use axum::Router;
use axum::response::{IntoResponse, Response};

pub use crate::handler::error::{Error, ErrorKind, Result};
use crate::service::ServiceState;

#[inline]
async fn fallback() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Returns a [`Router`] with all routes and a not-found fallback.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .merge(workflows::routes())
        .merge(jobs::routes())
        .merge(queues::routes())
        .merge(monitors::routes())
        .fallback(fallback)
}
