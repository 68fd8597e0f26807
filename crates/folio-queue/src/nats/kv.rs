//! Typed NATS KV buckets and keys.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use async_nats::jetstream::{self, kv};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::job::JobType;
use crate::{Error, Result, TRACING_TARGET_NATS};

/// Marker trait for KV key types.
pub trait KvKey: fmt::Debug + fmt::Display + FromStr + Clone + Send + Sync + 'static {}

/// Marker trait for KV bucket configuration.
pub trait KvBucket: Clone + Send + Sync + 'static {
    /// Bucket name used in NATS KV.
    const NAME: &'static str;

    /// Human-readable description for the bucket.
    const DESCRIPTION: &'static str;
}

/// Bucket holding job records of every queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobsBucket;

impl KvBucket for JobsBucket {
    const NAME: &'static str = "folio_jobs";
    const DESCRIPTION: &'static str = "Queued and finished jobs";
}

/// Bucket holding per-queue control flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueControlBucket;

impl KvBucket for QueueControlBucket {
    const NAME: &'static str = "folio_queue_control";
    const DESCRIPTION: &'static str = "Queue pause flags";
}

/// Bucket holding job metadata records.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobMetadataBucket;

impl KvBucket for JobMetadataBucket {
    const NAME: &'static str = "folio_job_metadata";
    const DESCRIPTION: &'static str = "Job metadata index";
}

/// Key of a job record: `<queue_name>.<job_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub job_type: JobType,
    pub job_id: Uuid,
}

impl KvKey for JobKey {}

impl JobKey {
    pub fn new(job_type: JobType, job_id: Uuid) -> Self {
        Self { job_type, job_id }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job_type.queue_name(), self.job_id)
    }
}

impl FromStr for JobKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (queue, id) = s
            .split_once('.')
            .ok_or_else(|| Error::operation("parse_job_key", format!("malformed key: {s}")))?;
        let job_type = JobType::all()
            .find(|job_type| job_type.queue_name() == queue)
            .ok_or_else(|| Error::operation("parse_job_key", format!("unknown queue: {queue}")))?;
        let job_id =
            Uuid::parse_str(id).map_err(|e| Error::operation("parse_job_key", e.to_string()))?;
        Ok(Self { job_type, job_id })
    }
}

/// Key of a queue control record: `<queue_name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey(pub JobType);

impl KvKey for QueueKey {}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.queue_name())
    }
}

impl FromStr for QueueKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::all()
            .find(|job_type| job_type.queue_name() == s)
            .map(Self)
            .ok_or_else(|| Error::operation("parse_queue_key", format!("unknown queue: {s}")))
    }
}

/// Key of a job metadata record: `<job_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataKey(pub Uuid);

impl KvKey for MetadataKey {}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MetadataKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s)
            .map_err(|e| Error::operation("parse_metadata_key", e.to_string()))?;
        Ok(Self(id))
    }
}

/// Value read from a bucket together with its revision.
#[derive(Debug, Clone)]
pub struct KvValue<V> {
    pub value: V,
    pub revision: u64,
}

/// Type-safe NATS KV store wrapper.
#[derive(Clone)]
pub struct KvStore<K, V, B>
where
    K: KvKey,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: KvBucket,
{
    store: kv::Store,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
    _bucket: PhantomData<B>,
}

impl<K, V, B> KvStore<K, V, B>
where
    K: KvKey,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: KvBucket,
{
    /// Create or get the bucket; `ttl` of zero keeps entries forever.
    #[tracing::instrument(skip(jetstream), target = TRACING_TARGET_NATS)]
    pub(crate) async fn open(jetstream: &jetstream::Context, ttl: Duration) -> Result<Self> {
        let store = match jetstream.get_key_value(B::NAME).await {
            Ok(store) => {
                tracing::debug!(
                    target: TRACING_TARGET_NATS,
                    bucket = %B::NAME,
                    "Using existing KV bucket"
                );
                store
            }
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_NATS,
                    bucket = %B::NAME,
                    ttl_secs = ttl.as_secs(),
                    "Creating new KV bucket"
                );
                let config = kv::Config {
                    bucket: B::NAME.to_string(),
                    description: B::DESCRIPTION.to_string(),
                    max_age: ttl,
                    ..Default::default()
                };
                jetstream
                    .create_key_value(config)
                    .await
                    .map_err(|e| Error::store("kv_create", e.to_string()))?
            }
        };

        Ok(Self {
            store,
            _key: PhantomData,
            _value: PhantomData,
            _bucket: PhantomData,
        })
    }

    /// Put a value into the store, returning the new revision.
    pub async fn put(&self, key: &K, value: &V) -> Result<u64> {
        let json = serde_json::to_vec(value)?;
        self.store
            .put(key.to_string(), json.into())
            .await
            .map_err(|e| Error::store("kv_put", e.to_string()))
    }

    /// Put a value only if the key does not exist yet.
    pub async fn create(&self, key: &K, value: &V) -> Result<u64> {
        let json = serde_json::to_vec(value)?;
        self.store
            .create(key.to_string(), json.into())
            .await
            .map_err(|e| Error::store("kv_create_key", e.to_string()))
    }

    /// Get a value with its revision.
    pub async fn get(&self, key: &K) -> Result<Option<KvValue<V>>> {
        let key_str = key.to_string();
        match self.store.entry(&key_str).await {
            Ok(Some(entry)) if matches!(entry.operation, kv::Operation::Put) => {
                let value = serde_json::from_slice(&entry.value)?;
                Ok(Some(KvValue {
                    value,
                    revision: entry.revision,
                }))
            }
            Ok(_) => Ok(None),
            Err(e) => Err(Error::store("kv_get", e.to_string())),
        }
    }

    /// Update a value only if the revision matches.
    pub async fn update(&self, key: &K, value: &V, revision: u64) -> Result<u64> {
        let json = serde_json::to_vec(value)?;
        self.store
            .update(key.to_string(), json.into(), revision)
            .await
            .map_err(|e| Error::store("kv_update", e.to_string()))
    }

    /// Delete a key and its history.
    pub async fn delete(&self, key: &K) -> Result<()> {
        self.store
            .purge(key.to_string())
            .await
            .map_err(|e| Error::store("kv_delete", e.to_string()))
    }

    /// Get all keys in the bucket that parse as `K`.
    pub async fn keys(&self) -> Result<Vec<K>> {
        let mut keys = Vec::new();
        let mut key_stream = self
            .store
            .keys()
            .await
            .map_err(|e| Error::store("kv_keys", e.to_string()))?;

        while let Some(key_result) = key_stream.next().await {
            match key_result {
                Ok(key_str) => {
                    if let Ok(key) = key_str.parse::<K>() {
                        keys.push(key);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        target: TRACING_TARGET_NATS,
                        error = %e,
                        bucket = %B::NAME,
                        "Error reading key from bucket"
                    );
                }
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_roundtrip() {
        let key = JobKey::new(JobType::TextCleaning, Uuid::nil());
        assert_eq!(
            key.to_string(),
            "text_cleaning.00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(key.to_string().parse::<JobKey>().unwrap(), key);
    }

    #[test]
    fn test_job_key_rejects_unknown_queue() {
        assert!("thumbnails.00000000-0000-0000-0000-000000000000"
            .parse::<JobKey>()
            .is_err());
        assert!("clustering".parse::<JobKey>().is_err());
    }

    #[test]
    fn test_queue_key() {
        let key: QueueKey = "summary_generation".parse().unwrap();
        assert_eq!(key.0, JobType::SummaryGeneration);
    }
}
