use std::collections::BTreeMap;

use serde::Serialize;
use superstep_core::{Edge, PartitionId, Partitioner, VertexId};

use crate::error::GraphError;

#[derive(Debug, Clone)]
struct VertexEntry<V, E> {
    value: V,
    edges: Vec<Edge<E>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub partition: PartitionId,
    pub vertex_count: usize,
    pub edge_count: usize,
}

/// Vertices owned by one partition: id, current value and adjacency list.
///
/// Only the owning partition's worker mutates a store. Every write is
/// checked against the partitioner; writing a vertex this partition does
/// not own is a programming error surfaced as [`GraphError::NotOwned`].
/// Iteration is in vertex-id order.
#[derive(Debug, Clone)]
pub struct PartitionStore<V, E> {
    partition: PartitionId,
    partitioner: Partitioner,
    vertices: BTreeMap<VertexId, VertexEntry<V, E>>,
    edge_count: usize,
}

impl<V, E> PartitionStore<V, E> {
    pub fn new(partition: PartitionId, partitioner: Partitioner) -> Self {
        Self {
            partition,
            partitioner,
            vertices: BTreeMap::new(),
            edge_count: 0,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    fn check_owned(&self, id: VertexId) -> Result<(), GraphError> {
        let owner = self.partitioner.partition_for(id);
        if owner != self.partition {
            return Err(GraphError::NotOwned {
                vertex: id,
                partition: self.partition,
                owner,
            });
        }
        Ok(())
    }

    /// Add a vertex at load time.
    pub fn insert_vertex(&mut self, id: VertexId, value: V) -> Result<(), GraphError> {
        self.check_owned(id)?;
        if self.vertices.contains_key(&id) {
            return Err(GraphError::DuplicateVertex(id));
        }
        self.vertices.insert(
            id,
            VertexEntry {
                value,
                edges: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append outgoing edges to an already inserted vertex.
    pub fn add_edges(
        &mut self,
        source: VertexId,
        edges: impl IntoIterator<Item = Edge<E>>,
    ) -> Result<(), GraphError> {
        self.check_owned(source)?;
        let entry = self
            .vertices
            .get_mut(&source)
            .ok_or(GraphError::DanglingEdgeSource(source))?;
        let before = entry.edges.len();
        entry.edges.extend(edges);
        self.edge_count += entry.edges.len() - before;
        Ok(())
    }

    pub fn get(&self, id: VertexId) -> Option<(&V, &[Edge<E>])> {
        self.vertices
            .get(&id)
            .map(|entry| (&entry.value, entry.edges.as_slice()))
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    /// Overwrite the value of an owned vertex.
    pub fn set(&mut self, id: VertexId, value: V) -> Result<(), GraphError> {
        self.check_owned(id)?;
        let entry = self
            .vertices
            .get_mut(&id)
            .ok_or(GraphError::VertexNotFound(id))?;
        entry.value = value;
        Ok(())
    }

    /// Iterate `(id, value, edges)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &V, &[Edge<E>])> {
        self.vertices
            .iter()
            .map(|(&id, entry)| (id, &entry.value, entry.edges.as_slice()))
    }

    pub fn ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            partition: self.partition,
            vertex_count: self.vertices.len(),
            edge_count: self.edge_count,
        }
    }
}

impl<V: Clone, E> PartitionStore<V, E> {
    /// Current `(id, value)` pairs, for result export.
    pub fn snapshot(&self) -> Vec<(VertexId, V)> {
        self.vertices
            .iter()
            .map(|(&id, entry)| (id, entry.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_ids(partitioner: Partitioner, partition: PartitionId, n: usize) -> Vec<VertexId> {
        (0..)
            .filter(|&id| partitioner.owns(partition, id))
            .take(n)
            .collect()
    }

    #[test]
    fn insert_get_set() {
        let partitioner = Partitioner::new(3).unwrap();
        let ids = owned_ids(partitioner, 1, 2);
        let mut store: PartitionStore<u64, ()> = PartitionStore::new(1, partitioner);

        store.insert_vertex(ids[0], 10).unwrap();
        store.insert_vertex(ids[1], 20).unwrap();
        store.add_edges(ids[0], vec![Edge::new(ids[1], ())]).unwrap();

        let (value, edges) = store.get(ids[0]).unwrap();
        assert_eq!(*value, 10);
        assert_eq!(edges.len(), 1);

        store.set(ids[0], 11).unwrap();
        assert_eq!(store.get(ids[0]).unwrap().0, &11);
        assert_eq!(store.stats().edge_count, 1);
        assert_eq!(store.snapshot(), vec![(ids[0], 11), (ids[1], 20)]);
    }

    #[test]
    fn set_on_foreign_vertex_is_rejected() {
        let partitioner = Partitioner::new(3).unwrap();
        let foreign = owned_ids(partitioner, 2, 1)[0];
        let mut store: PartitionStore<u64, ()> = PartitionStore::new(0, partitioner);

        assert!(matches!(
            store.set(foreign, 1),
            Err(GraphError::NotOwned { partition: 0, owner: 2, .. })
        ));
        assert!(matches!(
            store.insert_vertex(foreign, 1),
            Err(GraphError::NotOwned { .. })
        ));
    }

    #[test]
    fn set_on_missing_vertex_is_rejected() {
        let partitioner = Partitioner::new(1).unwrap();
        let mut store: PartitionStore<u64, ()> = PartitionStore::new(0, partitioner);
        assert!(matches!(store.set(5, 1), Err(GraphError::VertexNotFound(5))));
    }

    #[test]
    fn duplicates_and_dangling_edges() {
        let partitioner = Partitioner::new(1).unwrap();
        let mut store: PartitionStore<u64, ()> = PartitionStore::new(0, partitioner);
        store.insert_vertex(1, 0).unwrap();

        assert!(matches!(
            store.insert_vertex(1, 0),
            Err(GraphError::DuplicateVertex(1))
        ));
        assert!(matches!(
            store.add_edges(2, vec![Edge::new(1, ())]),
            Err(GraphError::DanglingEdgeSource(2))
        ));
    }

    #[test]
    fn iteration_is_ordered_by_id() {
        let partitioner = Partitioner::new(1).unwrap();
        let mut store: PartitionStore<&str, ()> = PartitionStore::new(0, partitioner);
        for id in [9, 3, 5] {
            store.insert_vertex(id, "v").unwrap();
        }
        assert_eq!(store.ids().collect::<Vec<_>>(), vec![3, 5, 9]);
    }
}
