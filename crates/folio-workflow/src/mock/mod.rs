//! In-memory collaborators for tests and local runs.
//!
//! - [`MemoryCatalog`] - Project, image, note and cluster records
//! - [`RecordingNotifier`] - Notifier keeping every update it was sent
//! - [`catalog_processors`] - Stage processors applying their effects to a catalog

mod catalog;
mod notifier;
mod processors;

pub use self::catalog::MemoryCatalog;
pub use self::notifier::{Notification, RecordingNotifier};
pub use self::processors::catalog_processors;
