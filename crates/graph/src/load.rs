use std::collections::HashSet;

use superstep_core::{Edge, GraphMeta, Partitioner, VertexId};
use tracing::{debug, info};

use crate::error::GraphError;
use crate::store::PartitionStore;

/// A graph split into one store per partition, plus its global shape.
#[derive(Debug)]
pub struct PartitionedGraph<V, E> {
    pub partitions: Vec<PartitionStore<V, E>>,
    pub meta: GraphMeta,
}

/// Split typed vertices and source-grouped edges across partitions.
///
/// Every vertex lands in the store of the partition computed by
/// `partitioner`. Duplicate vertex ids, duplicate edge lists and edge lists
/// whose source has no vertex record are rejected.
pub fn partition_graph<V, E>(
    partitioner: Partitioner,
    vertices: impl IntoIterator<Item = (VertexId, V)>,
    edges: impl IntoIterator<Item = (VertexId, Vec<Edge<E>>)>,
) -> Result<PartitionedGraph<V, E>, GraphError> {
    let mut partitions: Vec<PartitionStore<V, E>> = partitioner
        .partitions()
        .map(|p| PartitionStore::new(p, partitioner))
        .collect();

    let mut vertex_count = 0u64;
    for (id, value) in vertices {
        let p = partitioner.partition_for(id) as usize;
        partitions[p].insert_vertex(id, value)?;
        vertex_count += 1;
    }

    let mut seen_sources = HashSet::new();
    let mut edge_count = 0u64;
    for (source, list) in edges {
        if !seen_sources.insert(source) {
            return Err(GraphError::DuplicateEdgeList(source));
        }
        edge_count += list.len() as u64;
        let p = partitioner.partition_for(source) as usize;
        partitions[p].add_edges(source, list)?;
    }

    let meta = GraphMeta {
        vertex_count,
        edge_count,
        num_partitions: partitioner.num_partitions(),
    };
    for store in &partitions {
        let stats = store.stats();
        debug!(
            partition = stats.partition,
            vertices = stats.vertex_count,
            edges = stats.edge_count,
            "partition loaded"
        );
    }
    info!(
        vertices = vertex_count,
        edges = edge_count,
        partitions = meta.num_partitions,
        "graph partitioned"
    );

    Ok(PartitionedGraph { partitions, meta })
}
