//! Durable job store on NATS JetStream key-value buckets.

mod client;
mod config;
mod kv;
mod metadata_store;
mod queue_store;

pub use client::NatsClient;
pub use config::NatsConfig;
pub use kv::{JobKey, KvBucket, KvKey, MetadataKey, QueueKey};
pub use metadata_store::NatsMetadataStore;
pub use queue_store::NatsQueueStore;
