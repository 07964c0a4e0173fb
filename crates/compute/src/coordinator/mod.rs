//! Superstep coordination.
//!
//! One [`Coordinator`] drives a job. It spawns a tokio task per partition,
//! broadcasts each superstep, waits at the barrier for every partition's
//! report, merges aggregators and decides whether to continue.
//!
//! Split into focused submodules:
//! - `core`: the coordinator state machine and barrier loop
//! - `worker`: the per-partition task and its command/report protocol
//! - `phase`: coordinator phases and legal transitions
//! - `metrics`: per-job superstep statistics

mod core;
mod metrics;
mod phase;
mod worker;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use superstep_core::{EngineConfig, PartitionId};
use superstep_transport::{Coordination, PartitionedLog, StateStore};
use tokio::sync::watch;

use crate::lifecycle::{JobId, JobStatus, RunOptions};

pub use self::core::{Coordinator, HaltReason, Termination};
pub use metrics::{JobMetrics, SuperstepStats};
pub use phase::Phase;
pub use worker::PartitionReport;

/// Settings a coordinator runs with, resolved from engine config and
/// per-run options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub barrier_timeout: Duration,
    pub max_supersteps: Option<u64>,
    pub parallel_compute: bool,
    pub dedup_window: u64,
}

impl CoordinatorConfig {
    pub fn resolve(engine: &EngineConfig, options: &RunOptions) -> Self {
        Self {
            barrier_timeout: engine.barrier_timeout(),
            max_supersteps: options.max_supersteps.or(engine.max_supersteps),
            parallel_compute: engine.parallel_compute,
            dedup_window: engine.dedup_window,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::resolve(&EngineConfig::default(), &RunOptions::default())
    }
}

/// The services and channels one job's coordinator works against.
pub struct JobContext {
    pub job_id: JobId,
    pub log: Arc<dyn PartitionedLog>,
    pub store: Arc<dyn StateStore>,
    pub coordination: Arc<dyn Coordination>,
    pub status: Arc<watch::Sender<JobStatus>>,
    /// Flips to `true` when cancellation is requested.
    pub cancel: watch::Receiver<bool>,
    pub config: CoordinatorConfig,
}

pub(crate) fn job_prefix(job: JobId) -> String {
    format!("jobs/{job}/")
}

pub(crate) fn config_key(job: JobId) -> String {
    format!("jobs/{job}/config")
}

pub(crate) fn results_prefix(job: JobId) -> String {
    format!("jobs/{job}/results/")
}

pub(crate) fn result_key(job: JobId, partition: PartitionId) -> String {
    format!("jobs/{job}/results/{partition:05}")
}

pub(crate) fn leader_key(job: JobId) -> String {
    format!("jobs/{job}/leader")
}

pub(crate) fn superstep_key(job: JobId) -> String {
    format!("jobs/{job}/superstep")
}
