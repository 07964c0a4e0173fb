use serde::{Deserialize, Serialize};

/// Vertex key. Opaque to the engine apart from ordering and hashing.
pub type VertexId = u64;

/// Index of a graph partition, `0..num_partitions`.
pub type PartitionId = u32;

/// Global round counter, advanced only by the coordinator.
pub type Superstep = u64;

/// Outgoing edge. The source is implicit from the owning vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<E> {
    pub target: VertexId,
    pub value: E,
}

impl<E> Edge<E> {
    pub fn new(target: VertexId, value: E) -> Self {
        Self { target, value }
    }
}

/// Graph-wide facts fixed at INIT and visible to every compute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub vertex_count: u64,
    pub edge_count: u64,
    pub num_partitions: u32,
}
