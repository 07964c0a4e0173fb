use serde::{Deserialize, Serialize};

use crate::entity::{PartitionId, VertexId};
use crate::error::CoreError;

/// Upper bound on partitions per job.
pub const MAX_PARTITIONS: u32 = 4096;

/// Deterministic vertex-to-partition assignment.
///
/// The mapping is a pure function of the key and the partition count, so
/// every worker (and every re-run of a job) agrees on ownership without
/// coordination. It never changes for the lifetime of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitioner {
    num_partitions: u32,
}

impl Partitioner {
    pub fn new(num_partitions: u32) -> Result<Self, CoreError> {
        if num_partitions == 0 || num_partitions > MAX_PARTITIONS {
            return Err(CoreError::InvalidPartitionCount(num_partitions));
        }
        Ok(Self { num_partitions })
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    /// Partition owning `id`.
    pub fn partition_for(&self, id: VertexId) -> PartitionId {
        (mix64(id) % u64::from(self.num_partitions)) as PartitionId
    }

    /// Whether `partition` owns `id`.
    pub fn owns(&self, partition: PartitionId, id: VertexId) -> bool {
        self.partition_for(id) == partition
    }

    pub fn partitions(&self) -> impl Iterator<Item = PartitionId> {
        0..self.num_partitions
    }
}

/// SplitMix64 finalizer. Stable across platforms and compiler versions,
/// unlike `std`'s default hasher.
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
