use superstep_core::{Edge, GraphMeta, Superstep, VertexId};

use crate::aggregator::{AggregateValue, AggregatorSpec, CombineFn};
use crate::program::{Callback, VertexProgram, VertexRef};

/// Aggregator holding the L1 change of all ranks in a superstep.
pub const DELTA_AGGREGATOR: &str = "pagerank.delta";

/// PageRank by the power method, one iteration per superstep.
///
/// Ranks start at `1 / n`. Each superstep a vertex takes
/// `(1 - damping) / n + damping * sum(incoming shares)` and splits the new
/// rank evenly over its out-edges. Vertices halt together once the previous
/// superstep's total change drops below `tolerance`, or after
/// `max_iterations` supersteps.
#[derive(Debug, Clone, Copy)]
pub struct PageRank {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: u64,
}

impl Default for PageRank {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: 1e-4,
            max_iterations: 30,
        }
    }
}

impl VertexProgram for PageRank {
    type Value = f64;
    type EdgeValue = serde_json::Value;
    type Message = f64;

    fn name(&self) -> &str {
        "page_rank"
    }

    fn initial_value(
        &self,
        _id: VertexId,
        _raw: &serde_json::Value,
        meta: &GraphMeta,
    ) -> Result<f64, serde_json::Error> {
        Ok(1.0 / meta.vertex_count.max(1) as f64)
    }

    fn aggregators(&self) -> Vec<AggregatorSpec> {
        vec![AggregatorSpec::new(
            DELTA_AGGREGATOR,
            AggregateValue::Double(0.0),
            CombineFn::Sum,
        )]
    }

    fn combine(&self, left: &f64, right: &f64) -> Option<f64> {
        Some(left + right)
    }

    fn compute(
        &self,
        superstep: Superstep,
        vertex: VertexRef<'_, f64>,
        messages: &[f64],
        edges: &[Edge<serde_json::Value>],
        cb: &mut Callback<'_, f64, f64>,
    ) {
        let n = cb.num_vertices().max(1) as f64;
        let mut rank = *vertex.value;
        if superstep > 0 {
            let incoming: f64 = messages.iter().sum();
            let next = (1.0 - self.damping) / n + self.damping * incoming;
            cb.aggregate(DELTA_AGGREGATOR, AggregateValue::Double((next - rank).abs()));
            cb.set_new_vertex_value(next);
            rank = next;
        }

        // The delta read here was merged at the previous barrier; superstep 1
        // is the first to produce one.
        let converged = superstep >= 2
            && cb
                .aggregated_value(DELTA_AGGREGATOR)
                .and_then(|v| v.as_double())
                .is_some_and(|delta| delta < self.tolerance);
        if converged || superstep >= self.max_iterations {
            cb.vote_to_halt();
            return;
        }

        if !edges.is_empty() {
            let share = rank / edges.len() as f64;
            for edge in edges {
                cb.send_message_to(edge.target, share);
            }
        }
    }
}
