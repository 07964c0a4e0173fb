//! Bulk-synchronous vertex-centric graph computation.
//!
//! A job runs a [`VertexProgram`] over a partitioned graph in supersteps.
//! Messages sent in superstep `n` are delivered in `n + 1`, aggregators
//! merged at the barrier of `n` are readable in `n + 1`, and the job ends
//! once every vertex has voted to halt with no message in flight.

pub mod aggregator;
pub mod algorithms;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod program;
pub mod router;

pub use aggregator::{
    AggregateSnapshot, AggregateValue, AggregatorError, AggregatorRegistry, AggregatorSpec,
    CombineFn,
};
pub use coordinator::{Coordinator, CoordinatorConfig, JobContext, JobMetrics, Phase, Termination};
pub use error::EngineError;
pub use lifecycle::{
    AlgorithmConfig, JobConfig, JobId, JobManager, JobState, JobStatus, ResultRecord, RunOptions,
};
pub use program::{Callback, VertexProgram, VertexRef};
