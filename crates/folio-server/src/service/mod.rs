//! Application state shared by all handlers.

mod state;

pub use self::state::ServiceState;
