use superstep_core::{PartitionId, VertexId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("vertex {vertex} belongs to partition {owner}, not {partition}")]
    NotOwned {
        vertex: VertexId,
        partition: PartitionId,
        owner: PartitionId,
    },

    #[error("vertex not found: {0}")]
    VertexNotFound(VertexId),

    #[error("duplicate vertex: {0}")]
    DuplicateVertex(VertexId),

    #[error("edge list for vertex {0} has no matching vertex record")]
    DanglingEdgeSource(VertexId),

    #[error("duplicate edge list for vertex {0}")]
    DuplicateEdgeList(VertexId),
}
