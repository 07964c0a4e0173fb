use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use superstep_core::{Edge, GraphMeta, Superstep, VertexId};

use crate::aggregator::{AggregateSnapshot, AggregateValue, AggregatorSpec};

/// Bounds every vertex value, edge value and message type must satisfy.
pub trait Payload: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A vertex-centric algorithm.
///
/// `compute` is called once per active vertex per superstep. It sees the
/// vertex value as committed at the end of the previous superstep and the
/// messages sent to the vertex in the previous superstep. Everything it
/// wants to change goes through the [`Callback`]; the engine applies those
/// effects after the whole superstep has run.
///
/// Implementations must be deterministic given their inputs. Calls may run
/// concurrently on the rayon pool.
pub trait VertexProgram: Send + Sync + 'static {
    type Value: Payload;
    type EdgeValue: Payload;
    type Message: Payload;

    fn name(&self) -> &str;

    /// Turn a dataset value into the vertex's starting value.
    fn initial_value(
        &self,
        id: VertexId,
        raw: &serde_json::Value,
        meta: &GraphMeta,
    ) -> Result<Self::Value, serde_json::Error> {
        let _ = (id, meta);
        serde_json::from_value(raw.clone())
    }

    fn edge_value(&self, raw: &serde_json::Value) -> Result<Self::EdgeValue, serde_json::Error> {
        serde_json::from_value(raw.clone())
    }

    /// Aggregators this program contributes to or reads.
    fn aggregators(&self) -> Vec<AggregatorSpec> {
        Vec::new()
    }

    /// Receiver-side combiner. Returning `None` keeps both messages.
    fn combine(&self, left: &Self::Message, right: &Self::Message) -> Option<Self::Message> {
        let _ = (left, right);
        None
    }

    fn compute(
        &self,
        superstep: Superstep,
        vertex: VertexRef<'_, Self::Value>,
        messages: &[Self::Message],
        edges: &[Edge<Self::EdgeValue>],
        cb: &mut Callback<'_, Self::Value, Self::Message>,
    );
}

/// Read-only view of the vertex being computed.
#[derive(Debug, Clone, Copy)]
pub struct VertexRef<'a, V> {
    pub id: VertexId,
    pub value: &'a V,
}

/// Collects the effects of one compute call.
pub struct Callback<'a, V, M> {
    superstep: Superstep,
    meta: &'a GraphMeta,
    aggregates: &'a AggregateSnapshot,
    new_value: Option<V>,
    outgoing: Vec<(VertexId, M)>,
    deltas: Vec<(String, AggregateValue)>,
    halted: bool,
}

/// Effects staged by one compute call.
#[derive(Debug)]
pub(crate) struct VertexEffects<V, M> {
    pub new_value: Option<V>,
    pub outgoing: Vec<(VertexId, M)>,
    pub deltas: Vec<(String, AggregateValue)>,
    pub halted: bool,
}

impl<'a, V, M> Callback<'a, V, M> {
    pub(crate) fn new(
        superstep: Superstep,
        meta: &'a GraphMeta,
        aggregates: &'a AggregateSnapshot,
    ) -> Self {
        Self {
            superstep,
            meta,
            aggregates,
            new_value: None,
            outgoing: Vec::new(),
            deltas: Vec::new(),
            halted: false,
        }
    }

    /// Replace the vertex value. Takes effect at the end of the superstep;
    /// the last call wins.
    pub fn set_new_vertex_value(&mut self, value: V) {
        self.new_value = Some(value);
    }

    /// Queue a message for delivery to `target` in the next superstep.
    pub fn send_message_to(&mut self, target: VertexId, message: M) {
        self.outgoing.push((target, message));
    }

    /// Deactivate this vertex until a message arrives for it.
    pub fn vote_to_halt(&mut self) {
        self.halted = true;
    }

    /// Contribute `delta` to the named aggregator.
    pub fn aggregate(&mut self, name: &str, delta: AggregateValue) {
        self.deltas.push((name.to_string(), delta));
    }

    /// Merged value of the named aggregator from the previous barrier.
    /// `None` in superstep 0 and for unregistered names.
    pub fn aggregated_value(&self, name: &str) -> Option<AggregateValue> {
        self.aggregates.get(name)
    }

    pub fn superstep(&self) -> Superstep {
        self.superstep
    }

    pub fn num_vertices(&self) -> u64 {
        self.meta.vertex_count
    }

    pub fn meta(&self) -> &GraphMeta {
        self.meta
    }

    pub(crate) fn finish(self) -> VertexEffects<V, M> {
        VertexEffects {
            new_value: self.new_value,
            outgoing: self.outgoing,
            deltas: self.deltas,
            halted: self.halted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_stages_effects() {
        let meta = GraphMeta {
            vertex_count: 3,
            edge_count: 2,
            num_partitions: 1,
        };
        let snapshot = AggregateSnapshot::default();
        let mut cb: Callback<'_, u64, &str> = Callback::new(4, &meta, &snapshot);

        cb.set_new_vertex_value(1);
        cb.set_new_vertex_value(2);
        cb.send_message_to(7, "a");
        cb.send_message_to(8, "b");
        cb.aggregate("n", AggregateValue::Long(1));
        assert_eq!(cb.superstep(), 4);
        assert_eq!(cb.num_vertices(), 3);
        assert_eq!(cb.aggregated_value("n"), None);

        let effects = cb.finish();
        assert_eq!(effects.new_value, Some(2));
        assert_eq!(effects.outgoing, vec![(7, "a"), (8, "b")]);
        assert_eq!(effects.deltas.len(), 1);
        assert!(!effects.halted);
    }
}
