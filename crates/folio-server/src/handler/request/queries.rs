//! Query string types for HTTP handlers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound of `limit` on job listings.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Optional size limit of a listing.
#[must_use]
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct ListQuery {
    /// Maximum number of records to return; everything when unset.
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Returns the limit clamped to [`MAX_LIST_LIMIT`].
    pub fn limit(&self) -> Option<usize> {
        self.limit.map(|limit| limit.min(MAX_LIST_LIMIT))
    }
}

/// Grace period of a queue clean.
#[must_use]
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct CleanQuery {
    /// Minimum age in milliseconds of removed jobs; the queue default when unset.
    pub grace_ms: Option<u64>,
}

impl CleanQuery {
    pub fn grace(&self) -> Option<Duration> {
        self.grace_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let query = ListQuery { limit: Some(5000) };
        assert_eq!(query.limit(), Some(MAX_LIST_LIMIT));
        assert_eq!(ListQuery::default().limit(), None);
    }

    #[test]
    fn grace_is_milliseconds() {
        let query = CleanQuery {
            grace_ms: Some(1500),
        };
        assert_eq!(query.grace(), Some(Duration::from_millis(1500)));
    }
}
