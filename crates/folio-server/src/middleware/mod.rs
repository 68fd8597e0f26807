//! Router middleware: error recovery and request observability.

mod observability;
mod recovery;

pub use self::observability::{REQUEST_ID_HEADER, RouterObservabilityExt, log_request};
pub use self::recovery::{RecoveryConfig, RouterRecoveryExt, catch_panic, handle_error};
