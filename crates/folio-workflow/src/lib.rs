#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for workflow orchestration.
///
/// Use this target for logging stage transitions, job submissions and
/// workflow failures.
pub const TRACING_TARGET_ORCHESTRATOR: &str = "folio_workflow::orchestrator";

/// Tracing target for the workflow registry.
pub const TRACING_TARGET_REGISTRY: &str = "folio_workflow::registry";

/// Tracing target for notification delivery.
pub const TRACING_TARGET_NOTIFY: &str = "folio_workflow::notify";

mod config;
mod error;

pub mod collaborator;
pub mod orchestrator;
pub mod registry;
pub mod relay;
pub mod workflow;

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use folio_queue::BoxedError;
