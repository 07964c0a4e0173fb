use std::time::Duration;

use superstep_core::{CoreError, PartitionId, Superstep};
use superstep_graph::GraphError;
use superstep_transport::TransportError;
use thiserror::Error;

use crate::aggregator::AggregatorError;
use crate::lifecycle::{JobId, JobState};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid job config: {0}")]
    InvalidConfig(String),

    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("partition {partition} failed in superstep {superstep}: {reason}")]
    PartitionFailure {
        partition: PartitionId,
        superstep: Superstep,
        reason: String,
    },

    #[error("barrier timeout in superstep {superstep} after {timeout:?}: no report from partitions {partitions:?}")]
    BarrierTimeout {
        superstep: Superstep,
        timeout: Duration,
        partitions: Vec<PartitionId>,
    },

    #[error("result of job {job} not ready (state {state})")]
    ResultNotReady { job: JobId, state: JobState },

    #[error("cannot {operation} job {job} in state {state}")]
    InvalidState {
        job: JobId,
        state: JobState,
        operation: &'static str,
    },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("timed out after {timeout:?} waiting for job {job}")]
    WaitTimeout { job: JobId, timeout: Duration },

    #[error("coordinator error: {0}")]
    Coordinator(String),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
