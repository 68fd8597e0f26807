//! HTTP server startup and shutdown.

mod error;
mod http_server;
mod shutdown;

use axum::Router;

pub use self::error::{ServerError, ServerResult};
use self::http_server::serve_http;
pub use self::shutdown::shutdown_signal;
use crate::config::ServerConfig;

/// Serves the router until SIGTERM or Ctrl+C is received.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(app: Router, config: &ServerConfig) -> ServerResult<()> {
    serve_http(app, config, shutdown_signal()).await
}
