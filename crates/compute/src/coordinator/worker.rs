use std::any::Any;
use std::sync::Arc;

use superstep_core::{GraphMeta, PartitionId, Superstep};
use superstep_transport::StateStore;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

use crate::aggregator::{AggregateDeltas, AggregateSnapshot, AggregatorRegistry};
use crate::error::EngineError;
use crate::executor::PartitionExecutor;
use crate::lifecycle::{JobId, ResultRecord};
use crate::program::VertexProgram;
use crate::router::{combine_inbox, MessageRouter};

use super::result_key;

/// Instructions from the coordinator to one partition worker.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Compute {
        superstep: Superstep,
        aggregates: Arc<AggregateSnapshot>,
    },
    Export,
    Shutdown,
}

/// A partition's report for the barrier.
#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub partition: PartitionId,
    pub superstep: Superstep,
    pub active_vertices: u64,
    pub computed_vertices: u64,
    pub messages_sent: u64,
    pub duplicates_discarded: u64,
    pub deltas: AggregateDeltas,
}

#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Reported(PartitionReport),
    Exported {
        partition: PartitionId,
        vertices: usize,
    },
    Failed {
        partition: PartitionId,
        superstep: Superstep,
        reason: String,
    },
}

/// Owns one partition for the lifetime of a job.
pub(crate) struct PartitionWorker<P: VertexProgram> {
    pub(crate) job_id: JobId,
    pub(crate) partition: PartitionId,
    /// Taken while a compute pass runs on the blocking pool.
    pub(crate) executor: Option<PartitionExecutor<P>>,
    pub(crate) router: MessageRouter<P::Message>,
    pub(crate) registry: Arc<AggregatorRegistry>,
    pub(crate) meta: GraphMeta,
    pub(crate) store: Arc<dyn StateStore>,
}

impl<P: VertexProgram> PartitionWorker<P> {
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<WorkerCommand>,
        events: mpsc::Sender<WorkerEvent>,
    ) {
        let partition = self.partition;
        let mut last_superstep = 0;
        while let Some(command) = commands.recv().await {
            let event = match command {
                WorkerCommand::Compute {
                    superstep,
                    aggregates,
                } => {
                    last_superstep = superstep;
                    match self.superstep(superstep, aggregates).await {
                        Ok(report) => WorkerEvent::Reported(report),
                        Err(e) => failure(partition, superstep, e),
                    }
                }
                WorkerCommand::Export => match self.export().await {
                    Ok(vertices) => WorkerEvent::Exported {
                        partition,
                        vertices,
                    },
                    Err(e) => failure(partition, last_superstep, e),
                },
                WorkerCommand::Shutdown => break,
            };
            let failed = matches!(event, WorkerEvent::Failed { .. });
            if events.send(event).await.is_err() || failed {
                break;
            }
        }
        debug!(job = %self.job_id, partition, "partition worker stopped");
    }

    #[instrument(skip(self, aggregates), fields(job = %self.job_id, partition = self.partition))]
    async fn superstep(
        &mut self,
        superstep: Superstep,
        aggregates: Arc<AggregateSnapshot>,
    ) -> Result<PartitionReport, EngineError> {
        let partition = self.partition;
        let mut executor = self.executor.take().ok_or_else(|| {
            EngineError::Coordinator(format!("partition {partition} lost its executor"))
        })?;

        let delivery = match self.router.drain(superstep).await {
            Ok(delivery) => delivery,
            Err(e) => {
                self.executor = Some(executor);
                return Err(e);
            }
        };
        let program = Arc::clone(executor.program());
        let inbox = combine_inbox(delivery.inbox, |a, b| program.combine(a, b));

        let registry = Arc::clone(&self.registry);
        let meta = self.meta;
        let (executor, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = executor.run_superstep(superstep, inbox, &aggregates, &registry, &meta);
            (executor, outcome)
        })
        .await
        .map_err(|e| EngineError::PartitionFailure {
            partition,
            superstep,
            reason: if e.is_panic() {
                format!("compute panicked: {}", panic_message(e.into_panic()))
            } else {
                e.to_string()
            },
        })?;
        self.executor = Some(executor);
        let outcome = outcome?;

        let messages_sent = self.router.send_all(superstep, outcome.outgoing).await?;
        Ok(PartitionReport {
            partition,
            superstep,
            active_vertices: outcome.active as u64,
            computed_vertices: outcome.computed as u64,
            messages_sent,
            duplicates_discarded: delivery.duplicates as u64,
            deltas: outcome.deltas,
        })
    }

    /// Write this partition's final vertex values to the state store.
    async fn export(&self) -> Result<usize, EngineError> {
        let executor = self.executor.as_ref().ok_or_else(|| {
            EngineError::Coordinator(format!("partition {} lost its executor", self.partition))
        })?;
        let records = executor
            .store()
            .snapshot()
            .into_iter()
            .map(|(vertex, value)| {
                serde_json::to_value(value).map(|value| ResultRecord { vertex, value })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let bytes = serde_json::to_vec(&records)?;
        self.store
            .put(&result_key(self.job_id, self.partition), bytes)
            .await?;
        debug!(job = %self.job_id, partition = self.partition, vertices = records.len(), "exported partition");
        Ok(records.len())
    }
}

fn failure(partition: PartitionId, superstep: Superstep, e: EngineError) -> WorkerEvent {
    error!(partition, superstep, error = %e, "partition worker failed");
    let reason = match e {
        EngineError::PartitionFailure { reason, .. } => reason,
        other => other.to_string(),
    };
    WorkerEvent::Failed {
        partition,
        superstep,
        reason,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
