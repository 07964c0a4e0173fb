//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use superstep_compute::{JobId, JobManager, JobStatus, ResultRecord, RunOptions};
use superstep_core::{EngineConfig, VertexId};
use superstep_graph::{EdgeList, VertexRecord};
use superstep_transport::{
    DeliveryMode, InMemoryCoordination, InMemoryLogFactory, InMemoryStateStore,
};

pub const WAIT: Duration = Duration::from_secs(10);
pub const GRAPH: &str = "graph";

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        default_partitions: 4,
        barrier_timeout_ms: 5_000,
        ..EngineConfig::default()
    }
}

/// Directed pairs for a clique where every member links to every other.
pub fn clique(ids: RangeInclusive<VertexId>) -> Vec<(VertexId, VertexId)> {
    let ids: Vec<VertexId> = ids.collect();
    let mut pairs = Vec::new();
    for &a in &ids {
        for &b in &ids {
            if a != b {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

/// Group directed pairs into per-source edge lists.
pub fn edge_lists(pairs: &[(VertexId, VertexId)]) -> Vec<EdgeList> {
    let mut grouped: BTreeMap<VertexId, Vec<VertexId>> = BTreeMap::new();
    for &(source, target) in pairs {
        grouped.entry(source).or_default().push(target);
    }
    grouped
        .into_iter()
        .map(|(source, targets)| EdgeList::unweighted(source, targets))
        .collect()
}

pub fn vertices(ids: impl IntoIterator<Item = VertexId>) -> Vec<VertexRecord> {
    ids.into_iter()
        .map(|id| VertexRecord::new(id, Value::Null))
        .collect()
}

pub struct TestEngine {
    pub manager: JobManager,
    pub store: Arc<InMemoryStateStore>,
    pub coordination: Arc<InMemoryCoordination>,
}

pub fn engine(config: EngineConfig, mode: DeliveryMode) -> TestEngine {
    let store = Arc::new(InMemoryStateStore::new());
    let coordination = Arc::new(InMemoryCoordination::new());
    let manager = JobManager::new(
        config,
        Arc::new(InMemoryLogFactory::new(mode)),
        store.clone(),
        coordination.clone(),
    );
    TestEngine {
        manager,
        store,
        coordination,
    }
}

/// An exactly-once engine with `graph` registered as both datasets.
pub async fn engine_with_graph(
    ids: impl IntoIterator<Item = VertexId>,
    pairs: &[(VertexId, VertexId)],
) -> TestEngine {
    let engine = engine(engine_config(), DeliveryMode::ExactlyOnce);
    register(&engine.manager, ids, pairs).await;
    engine
}

pub async fn register(
    manager: &JobManager,
    ids: impl IntoIterator<Item = VertexId>,
    pairs: &[(VertexId, VertexId)],
) {
    manager.register_vertices(GRAPH, vertices(ids)).await;
    manager.register_edges(GRAPH, edge_lists(pairs)).await;
}

pub async fn run_to_end(manager: &JobManager, job: JobId, options: RunOptions) -> JobStatus {
    manager.run(job, options).await.unwrap();
    manager.wait(job, WAIT).await.unwrap()
}

/// Result records decoded into a map from vertex to value.
pub fn values<T: DeserializeOwned>(records: &[ResultRecord]) -> BTreeMap<VertexId, T> {
    records
        .iter()
        .map(|r| (r.vertex, r.value_as::<T>().unwrap()))
        .collect()
}
