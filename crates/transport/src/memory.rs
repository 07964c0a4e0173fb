//! In-process transport backends.
//!
//! Entries are kept MessagePack-encoded, exactly as they would sit in a
//! remote log, so every publish and drain goes through the wire codec.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use superstep_core::{PartitionId, Superstep};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TransportError;
use crate::message::Envelope;
use crate::traits::{Coordination, LogFactory, PartitionedLog, StateStore};

// ── Partitioned log ──────────────────────────────────────────────────

/// Delivery guarantee simulated by [`InMemoryLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    ExactlyOnce,
    /// Every `duplicate_every`-th publish is appended twice, as if the
    /// producer retried after a lost acknowledgement.
    AtLeastOnce { duplicate_every: u64 },
}

/// Partitioned log held in memory.
pub struct InMemoryLog {
    name: String,
    partitions: u32,
    mode: DeliveryMode,
    buckets: Mutex<HashMap<(PartitionId, Superstep), Vec<Vec<u8>>>>,
    publishes: AtomicU64,
    duplicates: AtomicU64,
}

impl InMemoryLog {
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self::with_mode(name, partitions, DeliveryMode::ExactlyOnce)
    }

    pub fn with_mode(name: impl Into<String>, partitions: u32, mode: DeliveryMode) -> Self {
        Self {
            name: name.into(),
            partitions,
            mode,
            buckets: Mutex::new(HashMap::new()),
            publishes: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of redundant copies appended so far.
    pub fn duplicates_injected(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Entries waiting in one bucket (duplicates included).
    pub async fn pending(&self, partition: PartitionId, superstep: Superstep) -> usize {
        self.buckets
            .lock()
            .await
            .get(&(partition, superstep))
            .map_or(0, Vec::len)
    }

    fn check_partition(&self, partition: PartitionId) -> Result<(), TransportError> {
        if partition >= self.partitions {
            return Err(TransportError::UnknownPartition {
                partition,
                partitions: self.partitions,
            });
        }
        Ok(())
    }

    fn should_duplicate(&self, publish_index: u64) -> bool {
        match self.mode {
            DeliveryMode::ExactlyOnce => false,
            DeliveryMode::AtLeastOnce { duplicate_every } => {
                duplicate_every > 0 && (publish_index + 1) % duplicate_every == 0
            }
        }
    }
}

#[async_trait]
impl PartitionedLog for InMemoryLog {
    fn num_partitions(&self) -> u32 {
        self.partitions
    }

    async fn publish(
        &self,
        partition: PartitionId,
        superstep: Superstep,
        envelope: Envelope,
    ) -> Result<(), TransportError> {
        self.check_partition(partition)?;
        let bytes = envelope.to_bytes()?;
        let index = self.publishes.fetch_add(1, Ordering::Relaxed);

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry((partition, superstep)).or_default();
        if self.should_duplicate(index) {
            bucket.push(bytes.clone());
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        }
        bucket.push(bytes);
        Ok(())
    }

    async fn drain(
        &self,
        partition: PartitionId,
        superstep: Superstep,
    ) -> Result<Vec<Envelope>, TransportError> {
        self.check_partition(partition)?;
        let entries = self
            .buckets
            .lock()
            .await
            .remove(&(partition, superstep))
            .unwrap_or_default();

        let envelopes = entries
            .iter()
            .map(|bytes| Envelope::from_bytes(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(log = %self.name, partition, superstep, count = envelopes.len(), "drained bucket");
        Ok(envelopes)
    }
}

/// Hands out [`InMemoryLog`]s, all sharing one delivery mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryLogFactory {
    mode: DeliveryMode,
}

impl InMemoryLogFactory {
    pub fn new(mode: DeliveryMode) -> Self {
        Self { mode }
    }
}

impl LogFactory for InMemoryLogFactory {
    fn create_log(
        &self,
        name: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> Result<Arc<dyn PartitionedLog>, TransportError> {
        if partitions == 0 {
            return Err(TransportError::InvalidLog(format!(
                "log '{name}' needs at least one partition"
            )));
        }
        if replication_factor == 0 {
            return Err(TransportError::InvalidLog(format!(
                "log '{name}' needs a replication factor of at least 1"
            )));
        }
        info!(log = %name, partitions, replication_factor, mode = ?self.mode, "created log");
        Ok(Arc::new(InMemoryLog::with_mode(name, partitions, self.mode)))
    }
}

// ── State store ──────────────────────────────────────────────────────

/// Ordered key-value store held in memory.
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), TransportError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TransportError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, TransportError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

// ── Coordination ─────────────────────────────────────────────────────

/// Single-process leader election and counters.
#[derive(Default)]
pub struct InMemoryCoordination {
    leaders: Mutex<HashMap<String, Uuid>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn leader(&self, key: &str) -> Option<Uuid> {
        self.leaders.lock().await.get(key).copied()
    }
}

#[async_trait]
impl Coordination for InMemoryCoordination {
    async fn acquire_leadership(&self, key: &str, holder: Uuid) -> Result<(), TransportError> {
        let mut leaders = self.leaders.lock().await;
        match leaders.get(key) {
            Some(&current) if current != holder => Err(TransportError::LeadershipHeld {
                key: key.to_string(),
                holder: current,
            }),
            _ => {
                leaders.insert(key.to_string(), holder);
                Ok(())
            }
        }
    }

    async fn release_leadership(&self, key: &str, holder: Uuid) -> Result<(), TransportError> {
        let mut leaders = self.leaders.lock().await;
        match leaders.get(key) {
            Some(&current) if current == holder => {
                leaders.remove(key);
                Ok(())
            }
            _ => Err(TransportError::LeadershipNotHeld {
                key: key.to_string(),
                holder,
            }),
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        new: u64,
    ) -> Result<bool, TransportError> {
        let mut counters = self.counters.lock().await;
        if counters.get(key).copied() != expected {
            return Ok(false);
        }
        counters.insert(key.to_string(), new);
        Ok(true)
    }

    async fn read_counter(&self, key: &str) -> Result<Option<u64>, TransportError> {
        Ok(self.counters.lock().await.get(key).copied())
    }

    async fn delete_counter(&self, key: &str) -> Result<bool, TransportError> {
        Ok(self.counters.lock().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sender: PartitionId, sequence: u64) -> Envelope {
        Envelope::new(sender, 0, sequence, 9, &sequence).unwrap()
    }

    #[tokio::test]
    async fn drain_consumes_bucket_once() {
        let log = InMemoryLog::new("t", 2);
        log.publish(1, 1, envelope(0, 0)).await.unwrap();
        log.publish(1, 1, envelope(0, 1)).await.unwrap();

        let first = log.drain(1, 1).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].sequence, 0);
        assert_eq!(first[1].sequence, 1);
        assert!(log.drain(1, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn buckets_are_isolated_by_superstep() {
        let log = InMemoryLog::new("t", 1);
        log.publish(0, 1, envelope(0, 0)).await.unwrap();
        log.publish(0, 2, envelope(0, 1)).await.unwrap();

        assert_eq!(log.drain(0, 2).await.unwrap().len(), 1);
        assert_eq!(log.pending(0, 1).await, 1);
    }

    #[tokio::test]
    async fn rejects_unknown_partition() {
        let log = InMemoryLog::new("t", 2);
        let err = log.publish(2, 0, envelope(0, 0)).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnknownPartition { partition: 2, partitions: 2 }
        ));
    }

    #[tokio::test]
    async fn at_least_once_mode_duplicates() {
        let log = InMemoryLog::with_mode("t", 1, DeliveryMode::AtLeastOnce { duplicate_every: 2 });
        for seq in 0..4 {
            log.publish(0, 1, envelope(0, seq)).await.unwrap();
        }
        assert_eq!(log.duplicates_injected(), 2);
        assert_eq!(log.drain(0, 1).await.unwrap().len(), 6);
    }

    #[test]
    fn factory_validates_settings() {
        let factory = InMemoryLogFactory::default();
        assert!(factory.create_log("ok", 3, 1).is_ok());
        assert!(factory.create_log("no-partitions", 0, 1).is_err());
        assert!(factory.create_log("no-replicas", 3, 0).is_err());
    }

    #[tokio::test]
    async fn state_store_prefix_ops() {
        let store = InMemoryStateStore::new();
        store.put("jobs/a/result/0", vec![1]).await.unwrap();
        store.put("jobs/a/result/1", vec![2]).await.unwrap();
        store.put("jobs/b/result/0", vec![3]).await.unwrap();

        let scanned = store.scan_prefix("jobs/a/").await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, "jobs/a/result/0");

        assert_eq!(store.delete_prefix("jobs/a/").await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("jobs/b/result/0").await.unwrap(), Some(vec![3]));
    }

    #[tokio::test]
    async fn leadership_is_exclusive() {
        let coord = InMemoryCoordination::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        coord.acquire_leadership("job", a).await.unwrap();
        coord.acquire_leadership("job", a).await.unwrap();
        assert!(matches!(
            coord.acquire_leadership("job", b).await,
            Err(TransportError::LeadershipHeld { holder, .. }) if holder == a
        ));
        assert!(coord.release_leadership("job", b).await.is_err());

        coord.release_leadership("job", a).await.unwrap();
        coord.acquire_leadership("job", b).await.unwrap();
        assert_eq!(coord.leader("job").await, Some(b));
    }

    #[tokio::test]
    async fn compare_and_set_advances_only_from_expected() {
        let coord = InMemoryCoordination::new();
        assert!(coord.compare_and_set("step", None, 0).await.unwrap());
        assert!(!coord.compare_and_set("step", None, 0).await.unwrap());
        assert!(coord.compare_and_set("step", Some(0), 1).await.unwrap());
        assert!(!coord.compare_and_set("step", Some(0), 2).await.unwrap());
        assert_eq!(coord.read_counter("step").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn deleted_counter_starts_over() {
        let coord = InMemoryCoordination::new();
        coord.compare_and_set("step", None, 4).await.unwrap();

        assert!(coord.delete_counter("step").await.unwrap());
        assert_eq!(coord.read_counter("step").await.unwrap(), None);
        assert!(!coord.delete_counter("step").await.unwrap());
        assert!(coord.compare_and_set("step", None, 0).await.unwrap());
    }
}
