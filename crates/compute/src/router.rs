//! Per-partition message routing over the partitioned log.
//!
//! Outgoing messages are wrapped in [`Envelope`]s and published to the
//! bucket of the target's owning partition for the *next* superstep. On the
//! receive side the router drops redelivered envelopes by their dedup key,
//! orders what is left by `(sender, sequence)` and groups it per vertex.

use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use superstep_core::{PartitionId, Partitioner, Superstep, VertexId};
use superstep_transport::{DedupKey, Envelope, PartitionedLog, TransportError};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Messages for each local vertex, in delivery order.
pub type Inbox<M> = BTreeMap<VertexId, Vec<M>>;

/// Dedup keys seen over the last few supersteps.
#[derive(Debug, Default)]
pub struct DedupWindow {
    seen: HashSet<DedupKey>,
    horizon: u64,
}

impl DedupWindow {
    pub fn new(horizon: u64) -> Self {
        Self {
            seen: HashSet::new(),
            horizon: horizon.max(1),
        }
    }

    /// Record `key`; false if it was already seen.
    pub fn first_sighting(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    /// Forget keys sent more than `horizon` supersteps before `current`.
    pub fn prune(&mut self, current: Superstep) {
        let horizon = self.horizon;
        self.seen.retain(|&(_, sent, _)| sent + horizon >= current);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// What one drain produced.
#[derive(Debug)]
pub struct Delivery<M> {
    pub inbox: Inbox<M>,
    pub delivered: usize,
    pub duplicates: usize,
}

pub struct MessageRouter<M> {
    partition: PartitionId,
    partitioner: Partitioner,
    log: Arc<dyn PartitionedLog>,
    dedup: DedupWindow,
    /// Next sequence number and the superstep it belongs to.
    sequence: (Superstep, u64),
    _message: PhantomData<fn() -> M>,
}

impl<M: Serialize + DeserializeOwned> MessageRouter<M> {
    pub fn new(
        partition: PartitionId,
        partitioner: Partitioner,
        log: Arc<dyn PartitionedLog>,
        dedup_window: u64,
    ) -> Self {
        Self {
            partition,
            partitioner,
            log,
            dedup: DedupWindow::new(dedup_window),
            sequence: (0, 0),
            _message: PhantomData,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    fn next_sequence(&mut self, superstep: Superstep) -> u64 {
        if self.sequence.0 != superstep {
            self.sequence = (superstep, 0);
        }
        let seq = self.sequence.1;
        self.sequence.1 += 1;
        seq
    }

    /// Publish one message sent in `superstep`. Returns once the log has it.
    pub async fn send(
        &mut self,
        superstep: Superstep,
        target: VertexId,
        message: &M,
    ) -> Result<(), EngineError> {
        let owner = self.partitioner.partition_for(target);
        let sequence = self.next_sequence(superstep);
        let envelope = Envelope::new(self.partition, superstep, sequence, target, message)
            .map_err(TransportError::from)?;
        self.log.publish(owner, superstep + 1, envelope).await?;
        Ok(())
    }

    /// Publish everything a partition produced in `superstep`, in order.
    pub async fn send_all(
        &mut self,
        superstep: Superstep,
        messages: Vec<(VertexId, M)>,
    ) -> Result<u64, EngineError> {
        let mut sent = 0u64;
        for (target, message) in messages {
            self.send(superstep, target, &message).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Consume the messages addressed to this partition for `superstep`.
    pub async fn drain(&mut self, superstep: Superstep) -> Result<Delivery<M>, EngineError> {
        let envelopes = self.log.drain(self.partition, superstep).await?;
        self.dedup.prune(superstep);

        let mut fresh = Vec::with_capacity(envelopes.len());
        let mut duplicates = 0usize;
        for envelope in envelopes {
            if envelope.superstep + 1 != superstep {
                warn!(
                    partition = self.partition,
                    superstep,
                    sent_in = envelope.superstep,
                    "discarding envelope from the wrong superstep"
                );
                continue;
            }
            let owner = self.partitioner.partition_for(envelope.target);
            if owner != self.partition {
                return Err(EngineError::Coordinator(format!(
                    "partition {} received a message for vertex {} owned by partition {owner}",
                    self.partition, envelope.target
                )));
            }
            if !self.dedup.first_sighting(envelope.dedup_key()) {
                duplicates += 1;
                continue;
            }
            fresh.push(envelope);
        }

        // The log only orders within one sender; fix the order across senders.
        fresh.sort_by_key(|e| (e.sender, e.sequence));

        let delivered = fresh.len();
        let mut inbox = Inbox::new();
        for envelope in fresh {
            let message: M = envelope.decode().map_err(TransportError::from)?;
            inbox.entry(envelope.target).or_insert_with(Vec::new).push(message);
        }

        if duplicates > 0 {
            debug!(
                partition = self.partition,
                superstep, duplicates, "discarded redelivered envelopes"
            );
        }
        Ok(Delivery {
            inbox,
            delivered,
            duplicates,
        })
    }
}

/// Fold adjacent messages with a combiner. `combine` returning `None` keeps
/// both messages.
pub fn combine_messages<M>(messages: Vec<M>, combine: impl Fn(&M, &M) -> Option<M>) -> Vec<M> {
    let mut out: Vec<M> = Vec::with_capacity(messages.len());
    for message in messages {
        let merged = out.last().and_then(|last| combine(last, &message));
        match merged {
            Some(m) => {
                if let Some(last) = out.last_mut() {
                    *last = m;
                }
            }
            None => out.push(message),
        }
    }
    out
}

/// Apply [`combine_messages`] to every vertex of an inbox.
pub fn combine_inbox<M>(inbox: Inbox<M>, combine: impl Fn(&M, &M) -> Option<M>) -> Inbox<M> {
    inbox
        .into_iter()
        .map(|(id, messages)| (id, combine_messages(messages, &combine)))
        .collect()
}
