//! Retry backoff policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Upper bound on any single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Shape of the backoff curve.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles with every failed attempt.
    #[default]
    Exponential,
}

/// Delay applied between attempts of a failing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    /// Base delay in milliseconds.
    pub base_ms: u64,
}

impl BackoffPolicy {
    /// Creates an exponential policy with the given base delay.
    pub fn exponential(base: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_ms: u64::try_from(base.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a fixed policy with the given delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the delay before retrying after `attempts_made` failed attempts.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let base = Duration::from_millis(self.base_ms);
        let delay = match self.kind {
            BackoffKind::Fixed => base,
            BackoffKind::Exponential => {
                let exponent = attempts_made.saturating_sub(1).min(31) as i32;
                base.mul_f64(2_f64.powi(exponent))
            }
        };

        delay.min(MAX_BACKOFF)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_BASE)
    }
}
