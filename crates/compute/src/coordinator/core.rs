use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use superstep_core::{PartitionId, Superstep};
use superstep_graph::PartitionedGraph;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::{AggregateDeltas, AggregateSnapshot, AggregatorRegistry};
use crate::error::EngineError;
use crate::executor::PartitionExecutor;
use crate::lifecycle::{JobState, JobStatus};
use crate::program::VertexProgram;
use crate::router::MessageRouter;

use super::metrics::{JobMetrics, SuperstepStats};
use super::phase::Phase;
use super::worker::{PartitionReport, PartitionWorker, WorkerCommand, WorkerEvent};
use super::{leader_key, superstep_key, JobContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// Every vertex voted to halt and no message is in flight.
    AllHalted,
    /// The superstep cap was reached.
    SuperstepLimit,
    Cancelled,
}

/// How and where a job stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    /// Last superstep that completed its barrier.
    pub superstep: Superstep,
    pub reason: HaltReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BarrierDecision {
    Continue,
    Halt(HaltReason),
}

/// What to do once every partition reported for `superstep`.
pub(crate) fn decide(
    superstep: Superstep,
    active_vertices: u64,
    messages_sent: u64,
    cancel_requested: bool,
    max_supersteps: Option<u64>,
) -> BarrierDecision {
    if cancel_requested {
        BarrierDecision::Halt(HaltReason::Cancelled)
    } else if active_vertices == 0 && messages_sent == 0 {
        BarrierDecision::Halt(HaltReason::AllHalted)
    } else if max_supersteps.is_some_and(|max| superstep + 1 >= max) {
        BarrierDecision::Halt(HaltReason::SuperstepLimit)
    } else {
        BarrierDecision::Continue
    }
}

struct Workers {
    commands: Vec<mpsc::Sender<WorkerCommand>>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    fn partitions(&self) -> BTreeSet<PartitionId> {
        (0..self.commands.len() as PartitionId).collect()
    }

    async fn broadcast(
        &self,
        superstep: Superstep,
        make: impl Fn() -> WorkerCommand,
    ) -> Result<(), EngineError> {
        for (partition, tx) in self.commands.iter().enumerate() {
            tx.send(make())
                .await
                .map_err(|_| EngineError::PartitionFailure {
                    partition: partition as PartitionId,
                    superstep,
                    reason: "worker exited".into(),
                })?;
        }
        Ok(())
    }

    /// Tell every worker to stop. Graceful stops wait up to `grace` per
    /// worker; otherwise, or after that, the task is aborted.
    async fn stop(self, graceful: bool, grace: Duration) {
        let Workers { commands, handles } = self;
        for tx in &commands {
            let _ = tx.try_send(WorkerCommand::Shutdown);
        }
        drop(commands);
        for mut handle in handles {
            if !graceful || tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

/// Drives one job from INIT to a final phase.
pub struct Coordinator<P: VertexProgram> {
    ctx: JobContext,
    program: Arc<P>,
    registry: Arc<AggregatorRegistry>,
    leader: Uuid,
    phase: Phase,
    aggregates: Arc<AggregateSnapshot>,
    metrics: JobMetrics,
}

impl<P: VertexProgram> Coordinator<P> {
    pub fn new(ctx: JobContext, program: Arc<P>, registry: AggregatorRegistry) -> Self {
        Self {
            ctx,
            program,
            registry: Arc::new(registry),
            leader: Uuid::new_v4(),
            phase: Phase::Init,
            aggregates: Arc::new(AggregateSnapshot::default()),
            metrics: JobMetrics::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the job to completion. The job's status channel reflects the
    /// outcome before this returns.
    #[instrument(skip_all, fields(job = %self.ctx.job_id, program = self.program.name()))]
    pub async fn run(
        mut self,
        graph: PartitionedGraph<P::Value, P::EdgeValue>,
    ) -> Result<Termination, EngineError> {
        self.execute(graph).await
    }

    pub(crate) async fn execute(
        &mut self,
        graph: PartitionedGraph<P::Value, P::EdgeValue>,
    ) -> Result<Termination, EngineError> {
        let leader_key = leader_key(self.ctx.job_id);
        if let Err(e) = self
            .ctx
            .coordination
            .acquire_leadership(&leader_key, self.leader)
            .await
        {
            let e = EngineError::from(e);
            self.fail(&e);
            return Err(e);
        }

        let result = match self.spawn_workers(graph) {
            Ok((workers, mut events)) => {
                let result = self.drive(&workers, &mut events).await;
                workers
                    .stop(result.is_ok(), self.ctx.config.barrier_timeout)
                    .await;
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self
            .ctx
            .coordination
            .release_leadership(&leader_key, self.leader)
            .await
        {
            warn!(error = %e, "could not release leadership");
        }

        match &result {
            Ok(termination) => self.finish(termination),
            Err(e) => self.fail(e),
        }
        result
    }

    fn spawn_workers(
        &mut self,
        graph: PartitionedGraph<P::Value, P::EdgeValue>,
    ) -> Result<(Workers, mpsc::Receiver<WorkerEvent>), EngineError> {
        let PartitionedGraph { partitions, meta } = graph;
        let log_partitions = self.ctx.log.num_partitions();
        if log_partitions != meta.num_partitions {
            return Err(EngineError::InvalidConfig(format!(
                "log has {log_partitions} partitions, graph has {}",
                meta.num_partitions
            )));
        }

        let (events_tx, events_rx) = mpsc::channel(partitions.len().max(1) * 2);
        let mut commands = Vec::with_capacity(partitions.len());
        let mut handles = Vec::with_capacity(partitions.len());
        for store in partitions {
            let partition = store.partition();
            let partitioner = store.partitioner();
            debug!(partition, vertices = store.len(), "starting partition worker");
            let worker = PartitionWorker {
                job_id: self.ctx.job_id,
                partition,
                executor: Some(PartitionExecutor::new(
                    Arc::clone(&self.program),
                    store,
                    self.ctx.config.parallel_compute,
                )),
                router: MessageRouter::new(
                    partition,
                    partitioner,
                    Arc::clone(&self.ctx.log),
                    self.ctx.config.dedup_window,
                ),
                registry: Arc::clone(&self.registry),
                meta,
                store: Arc::clone(&self.ctx.store),
            };
            let (tx, rx) = mpsc::channel(4);
            handles.push(tokio::spawn(worker.run(rx, events_tx.clone())));
            commands.push(tx);
        }

        info!(
            partitions = commands.len(),
            vertices = meta.vertex_count,
            edges = meta.edge_count,
            "job initialised"
        );
        Ok((Workers { commands, handles }, events_rx))
    }

    async fn drive(
        &mut self,
        workers: &Workers,
        events: &mut mpsc::Receiver<WorkerEvent>,
    ) -> Result<Termination, EngineError> {
        let counter = superstep_key(self.ctx.job_id);
        if !self
            .ctx
            .coordination
            .compare_and_set(&counter, None, 0)
            .await?
        {
            return Err(EngineError::Coordinator(format!(
                "superstep counter for job {} already exists",
                self.ctx.job_id
            )));
        }

        let mut superstep: Superstep = 0;
        loop {
            self.advance(Phase::Computing(superstep))?;
            let started = Instant::now();
            self.publish(|s| s.superstep = superstep);

            let aggregates = Arc::clone(&self.aggregates);
            workers
                .broadcast(superstep, || WorkerCommand::Compute {
                    superstep,
                    aggregates: Arc::clone(&aggregates),
                })
                .await?;
            let reports = self.collect_reports(workers, events, superstep).await?;

            self.advance(Phase::Barrier(superstep))?;
            let active: u64 = reports.iter().map(|r| r.active_vertices).sum();
            let messages: u64 = reports.iter().map(|r| r.messages_sent).sum();
            let partials: Vec<&AggregateDeltas> = reports.iter().map(|r| &r.deltas).collect();
            self.aggregates = Arc::new(self.registry.merge(&self.aggregates, superstep, &partials));
            self.metrics.record_superstep(SuperstepStats {
                superstep,
                active_vertices: active,
                computed_vertices: reports.iter().map(|r| r.computed_vertices).sum(),
                messages_sent: messages,
                duplicates_discarded: reports.iter().map(|r| r.duplicates_discarded).sum(),
                duration: started.elapsed(),
            });
            info!(superstep, active, messages, "barrier reached");

            let metrics = self.metrics.clone();
            self.publish(move |s| {
                s.active_vertices = active;
                s.metrics = metrics;
            });

            let cancel_requested = *self.ctx.cancel.borrow();
            match decide(
                superstep,
                active,
                messages,
                cancel_requested,
                self.ctx.config.max_supersteps,
            ) {
                BarrierDecision::Continue => {
                    if !self
                        .ctx
                        .coordination
                        .compare_and_set(&counter, Some(superstep), superstep + 1)
                        .await?
                    {
                        return Err(EngineError::Coordinator(format!(
                            "superstep counter moved during barrier {superstep}"
                        )));
                    }
                    superstep += 1;
                }
                BarrierDecision::Halt(HaltReason::Cancelled) => {
                    self.advance(Phase::Cancelled)?;
                    info!(superstep, "job cancelled at barrier");
                    return Ok(Termination {
                        superstep,
                        reason: HaltReason::Cancelled,
                    });
                }
                BarrierDecision::Halt(reason) => {
                    let vertices = self.export(workers, events, superstep).await?;
                    self.advance(Phase::Terminated)?;
                    info!(superstep, ?reason, vertices, "job terminated");
                    return Ok(Termination { superstep, reason });
                }
            }
        }
    }

    async fn next_event(
        &self,
        events: &mut mpsc::Receiver<WorkerEvent>,
        deadline: Instant,
        superstep: Superstep,
        pending: &BTreeSet<PartitionId>,
    ) -> Result<WorkerEvent, EngineError> {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(WorkerEvent::Failed {
                partition,
                superstep,
                reason,
            })) => Err(EngineError::PartitionFailure {
                partition,
                superstep,
                reason,
            }),
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(EngineError::Coordinator(
                "every partition worker exited".into(),
            )),
            Err(_) => {
                let partitions: Vec<PartitionId> = pending.iter().copied().collect();
                error!(superstep, ?partitions, "barrier timed out");
                Err(EngineError::BarrierTimeout {
                    superstep,
                    timeout: self.ctx.config.barrier_timeout,
                    partitions,
                })
            }
        }
    }

    async fn collect_reports(
        &self,
        workers: &Workers,
        events: &mut mpsc::Receiver<WorkerEvent>,
        superstep: Superstep,
    ) -> Result<Vec<PartitionReport>, EngineError> {
        let deadline = Instant::now() + self.ctx.config.barrier_timeout;
        let mut pending = workers.partitions();
        let mut reports = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            match self.next_event(events, deadline, superstep, &pending).await? {
                WorkerEvent::Reported(report)
                    if report.superstep == superstep && pending.contains(&report.partition) =>
                {
                    pending.remove(&report.partition);
                    reports.push(report);
                }
                other => warn!(superstep, event = ?other, "ignoring unexpected worker event"),
            }
        }
        reports.sort_by_key(|r| r.partition);
        Ok(reports)
    }

    async fn export(
        &self,
        workers: &Workers,
        events: &mut mpsc::Receiver<WorkerEvent>,
        superstep: Superstep,
    ) -> Result<usize, EngineError> {
        workers.broadcast(superstep, || WorkerCommand::Export).await?;
        let deadline = Instant::now() + self.ctx.config.barrier_timeout;
        let mut pending = workers.partitions();
        let mut vertices = 0;
        while !pending.is_empty() {
            match self.next_event(events, deadline, superstep, &pending).await? {
                WorkerEvent::Exported {
                    partition,
                    vertices: n,
                } if pending.contains(&partition) => {
                    pending.remove(&partition);
                    vertices += n;
                }
                other => warn!(superstep, event = ?other, "ignoring unexpected worker event"),
            }
        }
        Ok(vertices)
    }

    fn advance(&mut self, next: Phase) -> Result<(), EngineError> {
        if !self.phase.can_advance_to(&next) {
            return Err(EngineError::Coordinator(format!(
                "illegal phase transition {} -> {next}",
                self.phase
            )));
        }
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        Ok(())
    }

    fn publish(&self, update: impl FnOnce(&mut JobStatus)) {
        self.ctx.status.send_modify(|status| {
            update(status);
            status.updated_at = Utc::now();
        });
    }

    fn finish(&self, termination: &Termination) {
        let (state, diagnostic) = match termination.reason {
            HaltReason::Cancelled => (
                JobState::Cancelled,
                Some(format!(
                    "cancelled at the barrier of superstep {}",
                    termination.superstep
                )),
            ),
            HaltReason::SuperstepLimit => (
                JobState::Completed,
                Some(format!(
                    "stopped at the superstep limit after superstep {}",
                    termination.superstep
                )),
            ),
            HaltReason::AllHalted => (JobState::Completed, None),
        };
        self.publish(|s| {
            s.state = state;
            s.superstep = termination.superstep;
            s.diagnostic = diagnostic;
        });
    }

    fn fail(&mut self, e: &EngineError) {
        if self.phase.can_advance_to(&Phase::Failed) {
            self.phase = Phase::Failed;
        }
        error!(error = %e, "job failed");
        let diagnostic = e.to_string();
        let metrics = self.metrics.clone();
        self.publish(move |s| {
            s.state = JobState::Failed;
            s.diagnostic = Some(diagnostic);
            s.metrics = metrics;
        });
    }
}
