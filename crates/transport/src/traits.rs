use std::sync::Arc;

use async_trait::async_trait;
use superstep_core::{PartitionId, Superstep};
use uuid::Uuid;

use crate::error::TransportError;
use crate::message::Envelope;

/// A partitioned, durable log with per-partition ordering.
///
/// Entries are bucketed by `(partition, superstep)`. Publishes to one bucket
/// are returned by [`drain`](PartitionedLog::drain) in publish order. The log
/// may be at-least-once: consumers must tolerate duplicate envelopes.
#[async_trait]
pub trait PartitionedLog: Send + Sync {
    fn num_partitions(&self) -> u32;

    /// Append an envelope to the bucket consumed by `partition` in `superstep`.
    /// Returns once the entry is durable.
    async fn publish(
        &self,
        partition: PartitionId,
        superstep: Superstep,
        envelope: Envelope,
    ) -> Result<(), TransportError>;

    /// Remove and return everything in the `(partition, superstep)` bucket.
    async fn drain(
        &self,
        partition: PartitionId,
        superstep: Superstep,
    ) -> Result<Vec<Envelope>, TransportError>;
}

/// Blanket implementation so `Arc<dyn PartitionedLog>` can be used directly.
#[async_trait]
impl<T: PartitionedLog + ?Sized> PartitionedLog for Arc<T> {
    fn num_partitions(&self) -> u32 {
        (**self).num_partitions()
    }

    async fn publish(
        &self,
        partition: PartitionId,
        superstep: Superstep,
        envelope: Envelope,
    ) -> Result<(), TransportError> {
        (**self).publish(partition, superstep, envelope).await
    }

    async fn drain(
        &self,
        partition: PartitionId,
        superstep: Superstep,
    ) -> Result<Vec<Envelope>, TransportError> {
        (**self).drain(partition, superstep).await
    }
}

/// Creates one log per job, the way a job provisions its own topic.
pub trait LogFactory: Send + Sync {
    fn create_log(
        &self,
        name: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> Result<Arc<dyn PartitionedLog>, TransportError>;
}

/// Durable key-value snapshot store.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), TransportError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TransportError>;

    /// Delete all entries under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, TransportError>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), TransportError> {
        (**self).put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).get(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TransportError> {
        (**self).scan_prefix(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, TransportError> {
        (**self).delete_prefix(prefix).await
    }
}

/// Leader election and atomic counters for barrier agreement.
#[async_trait]
pub trait Coordination: Send + Sync {
    /// Become the single leader for `key`. Re-acquiring by the same holder
    /// succeeds; any other holder gets [`TransportError::LeadershipHeld`].
    async fn acquire_leadership(&self, key: &str, holder: Uuid) -> Result<(), TransportError>;

    async fn release_leadership(&self, key: &str, holder: Uuid) -> Result<(), TransportError>;

    /// Atomically set `key` to `new` if its current value equals `expected`
    /// (`None` = key absent). Returns whether the swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        new: u64,
    ) -> Result<bool, TransportError>;

    async fn read_counter(&self, key: &str) -> Result<Option<u64>, TransportError>;

    /// Remove a counter. Returns whether it existed.
    async fn delete_counter(&self, key: &str) -> Result<bool, TransportError>;
}

#[async_trait]
impl<T: Coordination + ?Sized> Coordination for Arc<T> {
    async fn acquire_leadership(&self, key: &str, holder: Uuid) -> Result<(), TransportError> {
        (**self).acquire_leadership(key, holder).await
    }

    async fn release_leadership(&self, key: &str, holder: Uuid) -> Result<(), TransportError> {
        (**self).release_leadership(key, holder).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        new: u64,
    ) -> Result<bool, TransportError> {
        (**self).compare_and_set(key, expected, new).await
    }

    async fn read_counter(&self, key: &str) -> Result<Option<u64>, TransportError> {
        (**self).read_counter(key).await
    }

    async fn delete_counter(&self, key: &str) -> Result<bool, TransportError> {
        (**self).delete_counter(key).await
    }
}
