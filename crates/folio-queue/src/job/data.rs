//! Job payloads and enqueue options.

use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::JobPriority;

/// Longest delay accepted when enqueueing a job.
pub const MAX_ENQUEUE_DELAY: Duration = Duration::from_secs(5 * 60);

/// Payload carried by every job.
///
/// The owning user, project and the job's own id are always present; the
/// remaining type-specific fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    /// Id the job is stored under.
    pub job_id: Uuid,
    /// User the job runs for.
    pub user_id: Uuid,
    /// Project the job belongs to.
    pub project_id: Uuid,
    /// When the job was enqueued, as seen by the queue clock.
    pub created_at: Timestamp,
    /// Type-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl JobData {
    /// Creates a payload with a fresh job id.
    ///
    /// `created_at` holds the wall clock until the queue restamps it.
    pub fn new(user_id: Uuid, project_id: Uuid) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            user_id,
            project_id,
            created_at: Timestamp::now(),
            fields: Map::new(),
        }
    }

    /// Adds a type-specific field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a type-specific field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Options accepted when enqueueing a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Queue priority; defaults to [`JobPriority::Normal`].
    #[serde(default)]
    pub priority: Option<JobPriority>,
    /// Time before the job becomes eligible, in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl JobOptions {
    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the enqueue delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the effective priority.
    #[inline]
    pub fn priority(&self) -> JobPriority {
        self.priority.unwrap_or_default()
    }

    /// Returns the effective delay, clamped to [`MAX_ENQUEUE_DELAY`].
    pub fn delay(&self) -> Duration {
        self.delay_ms
            .map(Duration::from_millis)
            .unwrap_or_default()
            .min(MAX_ENQUEUE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_flattened() {
        let data = JobData::new(Uuid::nil(), Uuid::nil()).with_field("image_id", "abc");
        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(json["image_id"], "abc");
        assert!(json.get("fields").is_none());

        let parsed: JobData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_delay_is_clamped() {
        let options = JobOptions::default().with_delay(Duration::from_secs(3600));
        assert_eq!(options.delay(), MAX_ENQUEUE_DELAY);
        assert_eq!(JobOptions::default().delay(), Duration::ZERO);
        assert_eq!(JobOptions::default().priority(), JobPriority::Normal);
    }
}
