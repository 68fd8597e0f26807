#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for job store operations.
///
/// Use this target for logging store reads, writes, claims and purges.
pub const TRACING_TARGET_STORE: &str = "folio_queue::store";

/// Tracing target for NATS connection and key-value operations.
pub const TRACING_TARGET_NATS: &str = "folio_queue::nats";

/// Tracing target for job queue service operations.
///
/// Use this target for logging enqueues, cancellations, retries and stalls.
pub const TRACING_TARGET_QUEUE: &str = "folio_queue::queue";

/// Tracing target for worker pool operations.
pub const TRACING_TARGET_WORKER: &str = "folio_queue::worker";

mod clock;
mod config;
mod error;

pub mod job;
pub mod nats;
pub mod prelude;
pub mod queue;
pub mod store;
pub mod worker;

pub use clock::Clock;
pub use config::QueueConfig;
pub use error::{BoxedError, Error, Result};
