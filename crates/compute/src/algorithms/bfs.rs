use superstep_core::{Edge, GraphMeta, Superstep, VertexId};

use crate::program::{Callback, VertexProgram, VertexRef};

/// Value of a vertex the search has not reached.
pub const UNVISITED: u64 = u64::MAX;

/// Unweighted single-source breadth-first search.
///
/// Each vertex ends with its hop distance from `source`, or [`UNVISITED`].
#[derive(Debug, Clone, Copy)]
pub struct BreadthFirstSearch {
    pub source: VertexId,
}

impl BreadthFirstSearch {
    pub fn new(source: VertexId) -> Self {
        Self { source }
    }
}

impl VertexProgram for BreadthFirstSearch {
    type Value = u64;
    type EdgeValue = serde_json::Value;
    type Message = u64;

    fn name(&self) -> &str {
        "bfs"
    }

    fn initial_value(
        &self,
        _id: VertexId,
        _raw: &serde_json::Value,
        _meta: &GraphMeta,
    ) -> Result<u64, serde_json::Error> {
        Ok(UNVISITED)
    }

    fn combine(&self, left: &u64, right: &u64) -> Option<u64> {
        Some(*left.min(right))
    }

    fn compute(
        &self,
        superstep: Superstep,
        vertex: VertexRef<'_, u64>,
        _messages: &[u64],
        edges: &[Edge<serde_json::Value>],
        cb: &mut Callback<'_, u64, u64>,
    ) {
        let reached = if superstep == 0 {
            vertex.id == self.source
        } else {
            *vertex.value == UNVISITED
        };
        if reached {
            cb.set_new_vertex_value(superstep);
            for edge in edges {
                cb.send_message_to(edge.target, superstep);
            }
        }
        cb.vote_to_halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateSnapshot;
    use crate::algorithms::harness::{nulls, run, unweighted};

    fn step(
        superstep: Superstep,
        id: VertexId,
        value: u64,
        targets: &[VertexId],
    ) -> (Option<u64>, Vec<(VertexId, u64)>) {
        let meta = GraphMeta {
            vertex_count: 4,
            edge_count: targets.len() as u64,
            num_partitions: 1,
        };
        let snapshot = AggregateSnapshot::default();
        let edges: Vec<Edge<serde_json::Value>> = targets
            .iter()
            .map(|&t| Edge::new(t, serde_json::Value::Null))
            .collect();
        let mut cb = Callback::new(superstep, &meta, &snapshot);
        BreadthFirstSearch::new(0).compute(
            superstep,
            VertexRef { id, value: &value },
            &[],
            &edges,
            &mut cb,
        );
        let effects = cb.finish();
        (effects.new_value, effects.outgoing)
    }

    #[test]
    fn frontier_forwards_its_own_distance() {
        assert_eq!(step(0, 0, UNVISITED, &[1, 2]), (Some(0), vec![(1, 0), (2, 0)]));
        assert_eq!(step(2, 3, UNVISITED, &[1]), (Some(2), vec![(1, 2)]));
        assert_eq!(step(3, 3, 2, &[1]), (None, vec![]));
    }

    #[test]
    fn distances_on_a_path() {
        let edges = unweighted(&[(0, 1), (1, 2), (2, 3)]);
        let (values, supersteps) = run(BreadthFirstSearch::new(0), nulls(0..5), edges, 100);

        assert_eq!(values[&0], 0);
        assert_eq!(values[&1], 1);
        assert_eq!(values[&3], 3);
        assert_eq!(values[&4], UNVISITED);
        assert_eq!(supersteps, 4);
    }

    #[test]
    fn shortest_of_several_routes_wins() {
        let edges = unweighted(&[(0, 1), (1, 2), (2, 3), (0, 3)]);
        let (values, _) = run(BreadthFirstSearch::new(0), nulls(0..4), edges, 100);
        assert_eq!(values[&3], 1);
        assert_eq!(values[&2], 2);
    }

    #[test]
    fn missing_source_reaches_nothing() {
        let edges = unweighted(&[(0, 1)]);
        let (values, supersteps) = run(BreadthFirstSearch::new(42), nulls(0..2), edges, 100);
        assert!(values.values().all(|&v| v == UNVISITED));
        assert_eq!(supersteps, 1);
    }
}
