use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use superstep_core::{Edge, GraphMeta, PartitionId, Superstep, VertexId};
use superstep_graph::PartitionStore;
use tracing::{debug, warn};

use crate::aggregator::{AggregateDeltas, AggregateSnapshot, AggregatorRegistry};
use crate::error::EngineError;
use crate::program::{Callback, VertexEffects, VertexProgram, VertexRef};
use crate::router::Inbox;

/// Everything one partition produced in one superstep.
#[derive(Debug)]
pub struct PassOutcome<M> {
    pub superstep: Superstep,
    pub outgoing: Vec<(VertexId, M)>,
    /// Vertices that were computed this superstep.
    pub computed: usize,
    /// Vertices still active after this superstep's halt votes.
    pub active: usize,
    pub deltas: AggregateDeltas,
    /// Messages addressed to vertices this partition does not have.
    pub undeliverable: usize,
}

struct Pending<'a, V, E, M> {
    id: VertexId,
    value: &'a V,
    edges: &'a [Edge<E>],
    messages: Vec<M>,
}

/// Runs a vertex program over the vertices of one partition.
///
/// Compute calls of a superstep only read the committed store. Their staged
/// effects are applied in vertex-id order once every call has returned.
pub struct PartitionExecutor<P: VertexProgram> {
    program: Arc<P>,
    store: PartitionStore<P::Value, P::EdgeValue>,
    halted: HashSet<VertexId>,
    parallel: bool,
}

impl<P: VertexProgram> PartitionExecutor<P> {
    pub fn new(
        program: Arc<P>,
        store: PartitionStore<P::Value, P::EdgeValue>,
        parallel: bool,
    ) -> Self {
        Self {
            program,
            store,
            halted: HashSet::new(),
            parallel,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.store.partition()
    }

    pub fn program(&self) -> &Arc<P> {
        &self.program
    }

    pub fn store(&self) -> &PartitionStore<P::Value, P::EdgeValue> {
        &self.store
    }

    pub fn is_halted(&self, id: VertexId) -> bool {
        self.halted.contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.store.len() - self.halted.len()
    }

    pub fn run_superstep(
        &mut self,
        superstep: Superstep,
        mut inbox: Inbox<P::Message>,
        aggregates: &AggregateSnapshot,
        registry: &AggregatorRegistry,
        meta: &GraphMeta,
    ) -> Result<PassOutcome<P::Message>, EngineError> {
        let partition = self.store.partition();

        let undeliverable: usize = inbox
            .iter()
            .filter(|(id, _)| !self.store.contains(**id))
            .map(|(_, messages)| messages.len())
            .sum();
        if undeliverable > 0 {
            warn!(
                partition,
                superstep, undeliverable, "dropping messages for unknown vertices"
            );
        }

        let halted = &self.halted;
        let work: Vec<Pending<'_, P::Value, P::EdgeValue, P::Message>> = self
            .store
            .iter()
            .filter_map(|(id, value, edges)| {
                let messages = inbox.remove(&id).unwrap_or_default();
                let active = superstep == 0 || !messages.is_empty() || !halted.contains(&id);
                active.then_some(Pending {
                    id,
                    value,
                    edges,
                    messages,
                })
            })
            .collect();

        let program = &*self.program;
        let effects: Vec<(VertexId, VertexEffects<P::Value, P::Message>)> =
            if self.parallel && work.len() > 1 {
                work.par_iter()
                    .map(|item| compute_one(program, superstep, meta, aggregates, item))
                    .collect()
            } else {
                work.iter()
                    .map(|item| compute_one(program, superstep, meta, aggregates, item))
                    .collect()
            };
        drop(work);

        let computed = effects.len();
        let mut outgoing = Vec::new();
        let mut deltas = AggregateDeltas::new();
        for (id, effect) in effects {
            if let Some(value) = effect.new_value {
                self.store.set(id, value)?;
            }
            if effect.halted {
                self.halted.insert(id);
            } else {
                self.halted.remove(&id);
            }
            outgoing.extend(effect.outgoing);
            for (name, delta) in effect.deltas {
                if let Err(e) = registry.accumulate(&mut deltas, &name, delta) {
                    warn!(partition, superstep, vertex = id, error = %e, "aggregate rejected");
                }
            }
        }

        let active = self.active_count();
        debug!(
            partition,
            superstep,
            computed,
            active,
            messages = outgoing.len(),
            "partition pass finished"
        );
        Ok(PassOutcome {
            superstep,
            outgoing,
            computed,
            active,
            deltas,
            undeliverable,
        })
    }
}

fn compute_one<P: VertexProgram>(
    program: &P,
    superstep: Superstep,
    meta: &GraphMeta,
    aggregates: &AggregateSnapshot,
    item: &Pending<'_, P::Value, P::EdgeValue, P::Message>,
) -> (VertexId, VertexEffects<P::Value, P::Message>) {
    let mut cb = Callback::new(superstep, meta, aggregates);
    program.compute(
        superstep,
        VertexRef {
            id: item.id,
            value: item.value,
        },
        &item.messages,
        item.edges,
        &mut cb,
    );
    (item.id, cb.finish())
}
