//! Metadata store backed by NATS JetStream KV.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::kv::{JobMetadataBucket, KvStore, MetadataKey};
use crate::job::JobMetadata;
use crate::store::MetadataStore;
use crate::{Result, TRACING_TARGET_STORE};

/// Durable job metadata index.
///
/// Record expiry is delegated to the bucket's `max_age`.
#[derive(Clone)]
pub struct NatsMetadataStore {
    records: KvStore<MetadataKey, JobMetadata, JobMetadataBucket>,
}

impl NatsMetadataStore {
    pub(crate) async fn open(
        jetstream: &async_nats::jetstream::Context,
        ttl: Duration,
    ) -> Result<Self> {
        Ok(Self {
            records: KvStore::open(jetstream, ttl).await?,
        })
    }
}

#[async_trait]
impl MetadataStore for NatsMetadataStore {
    async fn put(&self, metadata: &JobMetadata) -> Result<()> {
        self.records
            .put(&MetadataKey(metadata.job_id), metadata)
            .await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobMetadata>> {
        Ok(self
            .records
            .get(&MetadataKey(job_id))
            .await?
            .map(|entry| entry.value))
    }

    async fn delete(&self, job_id: Uuid) -> Result<()> {
        self.records.delete(&MetadataKey(job_id)).await
    }

    async fn list(&self) -> Result<Vec<JobMetadata>> {
        let keys = self.records.keys().await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            match self.records.get(&key).await {
                Ok(Some(entry)) => records.push(entry.value),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET_STORE,
                        key = %key,
                        error = %err,
                        "Skipping unreadable metadata record"
                    );
                }
            }
        }
        Ok(records)
    }
}
