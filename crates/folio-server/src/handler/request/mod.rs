//! Request types for HTTP handlers.

mod paths;
mod queries;
mod workflows;

pub use paths::*;
pub use queries::*;
pub use workflows::*;
