//! Request extractors whose rejections render as [`Error`] responses.
//!
//! Drop-in replacements for the axum [`Json`], [`Path`] and [`Query`]
//! extractors: a malformed body or parameter produces the same JSON error
//! body as every other failure of the API.
//!
//! [`Error`]: crate::handler::Error
//! [`Json`]: axum::Json
//! [`Path`]: axum::extract::Path
//! [`Query`]: axum::extract::Query

mod json;
mod path;
mod query;

pub use self::json::Json;
pub use self::path::Path;
pub use self::query::Query;

/// Shortens rejection details so they stay readable in responses.
fn sanitize_error_message(message: &str) -> String {
    let lines = message.lines().take(3).collect::<Vec<_>>();
    lines.join(" ").chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_truncates() {
        let message = format!("line one\nline two\nline three\nline four {}", "x".repeat(300));
        let sanitized = sanitize_error_message(&message);
        assert!(sanitized.starts_with("line one line two line three"));
        assert!(!sanitized.contains("four"));
        assert!(sanitized.chars().count() <= 200);
    }
}
