use superstep_core::{Edge, GraphMeta, Superstep, VertexId};

use crate::program::{Callback, VertexProgram, VertexRef};

/// Minimum-label propagation.
///
/// Every vertex starts labelled with its own id and adopts the smallest
/// label it hears about. On a graph whose edges run both ways each vertex
/// ends with the smallest id of its component.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectedComponents;

impl VertexProgram for ConnectedComponents {
    type Value = VertexId;
    type EdgeValue = serde_json::Value;
    type Message = VertexId;

    fn name(&self) -> &str {
        "connected_components"
    }

    fn initial_value(
        &self,
        id: VertexId,
        _raw: &serde_json::Value,
        _meta: &GraphMeta,
    ) -> Result<VertexId, serde_json::Error> {
        Ok(id)
    }

    fn combine(&self, left: &VertexId, right: &VertexId) -> Option<VertexId> {
        Some(*left.min(right))
    }

    fn compute(
        &self,
        superstep: Superstep,
        vertex: VertexRef<'_, VertexId>,
        messages: &[VertexId],
        edges: &[Edge<serde_json::Value>],
        cb: &mut Callback<'_, VertexId, VertexId>,
    ) {
        let current = *vertex.value;
        let label = messages.iter().copied().fold(current, VertexId::min);
        if superstep == 0 || label < current {
            if label != current {
                cb.set_new_vertex_value(label);
            }
            for edge in edges {
                cb.send_message_to(edge.target, label);
            }
        }
        cb.vote_to_halt();
    }
}
