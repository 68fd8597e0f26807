#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for remote stage processing.
pub const TRACING_TARGET_PROCESSOR: &str = "folio_remote::processor";

/// Tracing target for record service lookups.
pub const TRACING_TARGET_CATALOG: &str = "folio_remote::catalog";

/// Tracing target for webhook delivery.
pub const TRACING_TARGET_WEBHOOK: &str = "folio_remote::webhook";

mod client;
mod config;
mod error;

pub mod catalog;
pub mod processor;
pub mod webhook;

#[cfg(test)]
mod test_util;

pub use catalog::HttpCatalog;
pub use client::RemoteClient;
pub use config::RemoteConfig;
pub use error::{Error, Result};
pub use processor::HttpStageProcessor;
pub use webhook::WebhookNotifier;
