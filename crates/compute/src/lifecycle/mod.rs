//! Job lifecycle: configs, states and the [`JobManager`] that owns them.

mod driver;
mod job;
mod manager;

pub use job::{AlgorithmConfig, JobConfig, JobId, JobState, JobStatus, ResultRecord, RunOptions};
pub use manager::JobManager;
