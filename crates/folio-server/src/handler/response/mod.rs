//! Response types for HTTP handlers.

mod errors;
mod health;
mod jobs;
mod queues;
mod workflows;

pub use errors::*;
pub use health::*;
pub use jobs::*;
pub use queues::*;
pub use workflows::*;
