use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use superstep_core::{Edge, Partitioner};
use superstep_graph::{partition_graph, PartitionedGraph};
use superstep_transport::{
    Coordination, InMemoryCoordination, InMemoryLogFactory, InMemoryStateStore, LogFactory,
    StateStore, TransportError,
};
use tokio::sync::watch;
use uuid::Uuid;

use super::core::{decide, BarrierDecision};
use super::*;
use crate::aggregator::AggregatorRegistry;
use crate::algorithms::ConnectedComponents;
use crate::error::EngineError;
use crate::lifecycle::{JobState, JobStatus};

/// Undirected ring: every vertex links to both neighbours.
fn ring(n: u64, partitions: u32) -> PartitionedGraph<u64, Value> {
    let partitioner = Partitioner::new(partitions).unwrap();
    partition_graph(
        partitioner,
        (0..n).map(|id| (id, id)),
        (0..n).map(|id| {
            (
                id,
                vec![
                    Edge::new((id + 1) % n, Value::Null),
                    Edge::new((id + n - 1) % n, Value::Null),
                ],
            )
        }),
    )
    .unwrap()
}

struct Fixture {
    job_id: JobId,
    store: Arc<InMemoryStateStore>,
    coordination: Arc<InMemoryCoordination>,
    status: watch::Receiver<JobStatus>,
    _cancel: watch::Sender<bool>,
}

fn coordinator(
    log_partitions: u32,
    config: CoordinatorConfig,
) -> (Coordinator<ConnectedComponents>, Fixture) {
    let job_id = Uuid::new_v4();
    let store = Arc::new(InMemoryStateStore::new());
    let coordination = Arc::new(InMemoryCoordination::new());
    let (status_tx, status) = watch::channel(JobStatus::new(job_id, "connected_components"));
    let (cancel_tx, cancel) = watch::channel(false);
    let ctx = JobContext {
        job_id,
        log: InMemoryLogFactory::default()
            .create_log("coordinator-test", log_partitions, 1)
            .unwrap(),
        store: store.clone(),
        coordination: coordination.clone(),
        status: Arc::new(status_tx),
        cancel,
        config,
    };
    let coordinator = Coordinator::new(
        ctx,
        Arc::new(ConnectedComponents),
        AggregatorRegistry::new(),
    );
    (
        coordinator,
        Fixture {
            job_id,
            store,
            coordination,
            status,
            _cancel: cancel_tx,
        },
    )
}

#[test]
fn barrier_decisions() {
    assert_eq!(decide(0, 0, 0, false, None), BarrierDecision::Halt(HaltReason::AllHalted));
    assert_eq!(decide(0, 0, 3, false, None), BarrierDecision::Continue);
    assert_eq!(decide(0, 5, 0, false, None), BarrierDecision::Continue);
    assert_eq!(
        decide(4, 5, 5, false, Some(5)),
        BarrierDecision::Halt(HaltReason::SuperstepLimit)
    );
    assert_eq!(decide(3, 5, 5, false, Some(5)), BarrierDecision::Continue);
    // Cancellation wins even over a natural halt.
    assert_eq!(decide(2, 0, 0, true, None), BarrierDecision::Halt(HaltReason::Cancelled));
}

#[tokio::test]
async fn ring_runs_to_global_halt() {
    let (coordinator, fx) = coordinator(3, CoordinatorConfig::default());
    assert_eq!(coordinator.phase(), Phase::Init);

    let termination = coordinator.run(ring(12, 3)).await.unwrap();
    assert_eq!(termination.reason, HaltReason::AllHalted);

    let status = fx.status.borrow().clone();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.superstep, termination.superstep);
    assert_eq!(status.metrics.supersteps_completed, termination.superstep + 1);
    assert_eq!(status.active_vertices, 0);

    // The shared counter followed the coordinator through every barrier.
    let counter = fx
        .coordination
        .read_counter(&superstep_key(fx.job_id))
        .await
        .unwrap();
    assert_eq!(counter, Some(termination.superstep));
    assert_eq!(fx.coordination.leader(&leader_key(fx.job_id)).await, None);

    let exported = fx.store.scan_prefix(&results_prefix(fx.job_id)).await.unwrap();
    assert_eq!(exported.len(), 3);
}

#[tokio::test]
async fn superstep_cap_completes_early() {
    let config = CoordinatorConfig {
        max_supersteps: Some(2),
        ..CoordinatorConfig::default()
    };
    let (coordinator, fx) = coordinator(2, config);

    let termination = coordinator.run(ring(40, 2)).await.unwrap();
    assert_eq!(termination.reason, HaltReason::SuperstepLimit);
    assert_eq!(termination.superstep, 1);

    let status = fx.status.borrow().clone();
    assert_eq!(status.state, JobState::Completed);
    assert!(status.diagnostic.is_some());
}

#[tokio::test]
async fn leadership_held_elsewhere_fails_the_job() {
    let (coordinator, fx) = coordinator(2, CoordinatorConfig::default());
    fx.coordination
        .acquire_leadership(&leader_key(fx.job_id), Uuid::new_v4())
        .await
        .unwrap();

    let err = coordinator.run(ring(4, 2)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transport(TransportError::LeadershipHeld { .. })
    ));
    assert_eq!(fx.status.borrow().state, JobState::Failed);
}

#[tokio::test]
async fn stale_superstep_counter_fails_the_job() {
    let (coordinator, fx) = coordinator(2, CoordinatorConfig::default());
    fx.coordination
        .compare_and_set(&superstep_key(fx.job_id), None, 7)
        .await
        .unwrap();

    let err = coordinator.run(ring(4, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Coordinator(_)));
    let status = fx.status.borrow().clone();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.diagnostic.unwrap().contains("superstep counter"));
    // Leadership is released on the failure path too.
    assert_eq!(fx.coordination.leader(&leader_key(fx.job_id)).await, None);
}

#[tokio::test]
async fn log_partition_mismatch_is_rejected() {
    let (coordinator, fx) = coordinator(3, CoordinatorConfig::default());
    let err = coordinator.run(ring(4, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
    assert_eq!(fx.status.borrow().state, JobState::Failed);
}

/// Accepts nothing; every write fails.
struct ReadOnlyStore;

#[async_trait]
impl StateStore for ReadOnlyStore {
    async fn put(&self, key: &str, _value: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(format!("read-only store refused {key}")))
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(None)
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TransportError> {
        Ok(Vec::new())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, TransportError> {
        Ok(0)
    }
}

#[tokio::test]
async fn failed_export_leaves_the_coordinator_failed() {
    let job_id = Uuid::new_v4();
    let (status_tx, status) = watch::channel(JobStatus::new(job_id, "connected_components"));
    let (_cancel_tx, cancel) = watch::channel(false);
    let ctx = JobContext {
        job_id,
        log: InMemoryLogFactory::default()
            .create_log("export-test", 2, 1)
            .unwrap(),
        store: Arc::new(ReadOnlyStore),
        coordination: Arc::new(InMemoryCoordination::new()),
        status: Arc::new(status_tx),
        cancel,
        config: CoordinatorConfig::default(),
    };
    let mut coordinator = Coordinator::new(
        ctx,
        Arc::new(ConnectedComponents),
        AggregatorRegistry::new(),
    );

    let err = coordinator.execute(ring(6, 2)).await.unwrap_err();
    assert!(matches!(err, EngineError::PartitionFailure { .. }), "{err}");
    assert_eq!(coordinator.phase(), Phase::Failed);

    let status = status.borrow().clone();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.diagnostic.unwrap().contains("read-only store"));
}

#[test]
fn config_resolution_prefers_run_options() {
    let engine = superstep_core::EngineConfig {
        max_supersteps: Some(50),
        barrier_timeout_ms: 1_500,
        ..Default::default()
    };
    let from_engine = CoordinatorConfig::resolve(&engine, &RunOptions::default());
    assert_eq!(from_engine.max_supersteps, Some(50));
    assert_eq!(from_engine.barrier_timeout, Duration::from_millis(1_500));

    let overridden = CoordinatorConfig::resolve(
        &engine,
        &RunOptions {
            max_supersteps: Some(3),
        },
    );
    assert_eq!(overridden.max_supersteps, Some(3));
}
