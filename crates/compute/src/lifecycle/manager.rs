use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use superstep_core::{EngineConfig, Partitioner};
use superstep_graph::{EdgeList, VertexRecord};
use superstep_transport::{
    Coordination, InMemoryCoordination, InMemoryLogFactory, InMemoryStateStore, LogFactory,
    StateStore,
};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::algorithms::{BreadthFirstSearch, ConnectedComponents, PageRank};
use crate::coordinator::{
    config_key, job_prefix, results_prefix, superstep_key, CoordinatorConfig, JobContext,
};
use crate::error::EngineError;
use crate::program::VertexProgram;

use super::driver::{JobDriver, ProgramDriver};
use super::job::{AlgorithmConfig, JobConfig, JobId, JobState, JobStatus, ResultRecord, RunOptions};

impl AlgorithmConfig {
    pub(crate) fn driver(&self) -> Arc<dyn JobDriver> {
        match *self {
            Self::Bfs { source } => Arc::new(ProgramDriver::new(BreadthFirstSearch::new(source))),
            Self::ConnectedComponents => Arc::new(ProgramDriver::new(ConnectedComponents)),
            Self::PageRank {
                damping,
                tolerance,
                max_iterations,
            } => Arc::new(ProgramDriver::new(PageRank {
                damping,
                tolerance,
                max_iterations,
            })),
        }
    }
}

struct JobEntry {
    partitioner: Partitioner,
    replication_factor: u16,
    vertices: Arc<Vec<VertexRecord>>,
    edges: Arc<Vec<EdgeList>>,
    driver: Arc<dyn JobDriver>,
    status: Arc<watch::Sender<JobStatus>>,
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn state(&self) -> JobState {
        self.status.borrow().state
    }
}

/// Creates, runs and tracks jobs against a set of registered datasets.
pub struct JobManager {
    config: EngineConfig,
    logs: Arc<dyn LogFactory>,
    store: Arc<dyn StateStore>,
    coordination: Arc<dyn Coordination>,
    vertex_datasets: RwLock<HashMap<String, Arc<Vec<VertexRecord>>>>,
    edge_datasets: RwLock<HashMap<String, Arc<Vec<EdgeList>>>>,
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobManager {
    pub fn new(
        config: EngineConfig,
        logs: Arc<dyn LogFactory>,
        store: Arc<dyn StateStore>,
        coordination: Arc<dyn Coordination>,
    ) -> Self {
        Self {
            config,
            logs,
            store,
            coordination,
            vertex_datasets: RwLock::new(HashMap::new()),
            edge_datasets: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// A manager backed entirely by in-process services.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryLogFactory::default()),
            Arc::new(InMemoryStateStore::new()),
            Arc::new(InMemoryCoordination::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register (or replace) a named vertex dataset. Jobs created earlier
    /// keep the version they were created with.
    pub async fn register_vertices(&self, name: impl Into<String>, records: Vec<VertexRecord>) {
        let name = name.into();
        info!(dataset = %name, vertices = records.len(), "registered vertex dataset");
        self.vertex_datasets
            .write()
            .await
            .insert(name, Arc::new(records));
    }

    pub async fn register_edges(&self, name: impl Into<String>, lists: Vec<EdgeList>) {
        let name = name.into();
        info!(dataset = %name, sources = lists.len(), "registered edge dataset");
        self.edge_datasets.write().await.insert(name, Arc::new(lists));
    }

    /// Validate a job config against the registered datasets and persist it.
    #[instrument(skip_all, fields(algorithm = config.algorithm.name()))]
    pub async fn create(&self, config: JobConfig) -> Result<JobId, EngineError> {
        config.algorithm.validate()?;
        let persisted = serde_json::to_value(&config)?;
        self.admit(
            config.algorithm.driver(),
            &config.vertices,
            &config.edges,
            config.num_partitions,
            config.replication_factor,
            persisted,
        )
        .await
    }

    /// Create a job that runs a caller-supplied vertex program.
    #[instrument(skip_all, fields(program = program.name()))]
    pub async fn create_with_program<P: VertexProgram>(
        &self,
        program: P,
        vertices: &str,
        edges: &str,
        num_partitions: Option<u32>,
    ) -> Result<JobId, EngineError> {
        let persisted = serde_json::json!({
            "program": program.name(),
            "vertices": vertices,
            "edges": edges,
            "num_partitions": num_partitions,
        });
        self.admit(
            Arc::new(ProgramDriver::new(program)),
            vertices,
            edges,
            num_partitions,
            1,
            persisted,
        )
        .await
    }

    async fn admit(
        &self,
        driver: Arc<dyn JobDriver>,
        vertices: &str,
        edges: &str,
        num_partitions: Option<u32>,
        replication_factor: u16,
        persisted: serde_json::Value,
    ) -> Result<JobId, EngineError> {
        let partitions = num_partitions.unwrap_or(self.config.default_partitions);
        let partitioner =
            Partitioner::new(partitions).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        if replication_factor == 0 {
            return Err(EngineError::InvalidConfig(
                "replication_factor must be at least 1".into(),
            ));
        }

        let vertex_records = self
            .vertex_datasets
            .read()
            .await
            .get(vertices)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDataset(vertices.to_string()))?;
        let edge_lists = self
            .edge_datasets
            .read()
            .await
            .get(edges)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDataset(edges.to_string()))?;

        let meta = driver.validate(partitioner, &vertex_records, &edge_lists)?;

        let job_id = Uuid::new_v4();
        self.store
            .put(&config_key(job_id), serde_json::to_vec(&persisted)?)
            .await?;

        let (status, _) = watch::channel(JobStatus::new(job_id, driver.program_name()));
        let (cancel, _) = watch::channel(false);
        info!(
            job = %job_id,
            partitions,
            vertices = meta.vertex_count,
            edges = meta.edge_count,
            "job created"
        );
        self.jobs.write().await.insert(
            job_id,
            JobEntry {
                partitioner,
                replication_factor,
                vertices: vertex_records,
                edges: edge_lists,
                driver,
                status: Arc::new(status),
                cancel,
                handle: None,
            },
        );
        Ok(job_id)
    }

    /// Start a created job. Returns immediately; use [`wait`](Self::wait) or
    /// [`status`](Self::status) to follow it.
    #[instrument(skip(self), fields(job = %job_id))]
    pub async fn run(&self, job_id: JobId, options: RunOptions) -> Result<JobStatus, EngineError> {
        if options.max_supersteps == Some(0) {
            return Err(EngineError::InvalidConfig(
                "max_supersteps must be at least 1".into(),
            ));
        }

        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(EngineError::JobNotFound(job_id))?;
        let state = entry.state();
        if state != JobState::Created {
            return Err(EngineError::InvalidState {
                job: job_id,
                state,
                operation: "run",
            });
        }

        let log = self.logs.create_log(
            &format!("superstep-{job_id}-messages"),
            entry.partitioner.num_partitions(),
            entry.replication_factor,
        )?;
        entry.status.send_modify(|s| {
            s.state = JobState::Running;
            s.updated_at = Utc::now();
        });

        let ctx = JobContext {
            job_id,
            log,
            store: Arc::clone(&self.store),
            coordination: Arc::clone(&self.coordination),
            status: Arc::clone(&entry.status),
            cancel: entry.cancel.subscribe(),
            config: CoordinatorConfig::resolve(&self.config, &options),
        };
        entry.handle = Some(entry.driver.launch(
            ctx,
            entry.partitioner,
            Arc::clone(&entry.vertices),
            Arc::clone(&entry.edges),
        ));
        info!(max_supersteps = ?options.max_supersteps, "job started");
        let status = entry.status.borrow().clone();
        Ok(status)
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatus, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(EngineError::JobNotFound(job_id))?;
        let status = entry.status.borrow().clone();
        Ok(status)
    }

    pub async fn jobs(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<JobStatus> = jobs.values().map(|e| e.status.borrow().clone()).collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Request cancellation. A running job stops at its next barrier; a job
    /// that never ran is cancelled immediately.
    #[instrument(skip(self), fields(job = %job_id))]
    pub async fn cancel(&self, job_id: JobId) -> Result<JobStatus, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(EngineError::JobNotFound(job_id))?;
        match entry.state() {
            JobState::Created => {
                entry.status.send_modify(|s| {
                    s.state = JobState::Cancelled;
                    s.diagnostic = Some("cancelled before it ran".into());
                    s.updated_at = Utc::now();
                });
                info!("job cancelled before running");
            }
            JobState::Running => {
                entry.cancel.send_replace(true);
                info!("cancellation requested; takes effect at the next barrier");
            }
            state => {
                return Err(EngineError::InvalidState {
                    job: job_id,
                    state,
                    operation: "cancel",
                })
            }
        }
        let status = entry.status.borrow().clone();
        Ok(status)
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self, job_id: JobId, timeout: Duration) -> Result<JobStatus, EngineError> {
        let mut rx = {
            let jobs = self.jobs.read().await;
            let entry = jobs.get(&job_id).ok_or(EngineError::JobNotFound(job_id))?;
            entry.status.subscribe()
        };
        let terminal = tokio::time::timeout(timeout, rx.wait_for(|s| s.state.is_terminal()))
            .await
            .map_err(|_| EngineError::WaitTimeout { job: job_id, timeout })?;
        match terminal {
            Ok(status) => Ok(status.clone()),
            Err(_) => Err(EngineError::JobNotFound(job_id)),
        }
    }

    /// Final vertex values of a completed job, ordered by vertex id.
    pub async fn result(&self, job_id: JobId) -> Result<Vec<ResultRecord>, EngineError> {
        let state = {
            let jobs = self.jobs.read().await;
            jobs.get(&job_id)
                .ok_or(EngineError::JobNotFound(job_id))?
                .state()
        };
        if state != JobState::Completed {
            return Err(EngineError::ResultNotReady { job: job_id, state });
        }

        let mut records: Vec<ResultRecord> = Vec::new();
        for (_, bytes) in self.store.scan_prefix(&results_prefix(job_id)).await? {
            records.extend(serde_json::from_slice::<Vec<ResultRecord>>(&bytes)?);
        }
        records.sort_by_key(|r| r.vertex);
        Ok(records)
    }

    /// Forget a job that is not running and delete everything it stored,
    /// including its superstep counter.
    #[instrument(skip(self), fields(job = %job_id))]
    pub async fn discard(&self, job_id: JobId) -> Result<(), EngineError> {
        let mut jobs = self.jobs.write().await;
        let state = jobs
            .get(&job_id)
            .ok_or(EngineError::JobNotFound(job_id))?
            .state();
        if state == JobState::Running {
            return Err(EngineError::InvalidState {
                job: job_id,
                state,
                operation: "discard",
            });
        }
        if let Some(entry) = jobs.remove(&job_id) {
            if let Some(handle) = entry.handle {
                if !handle.is_finished() {
                    warn!("coordinator task still alive after a terminal state; aborting");
                    handle.abort();
                }
            }
        }
        drop(jobs);

        let removed = self.store.delete_prefix(&job_prefix(job_id)).await?;
        self.coordination
            .delete_counter(&superstep_key(job_id))
            .await?;
        info!(removed, "job discarded");
        Ok(())
    }
}
