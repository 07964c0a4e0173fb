use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use superstep_core::{Superstep, VertexId};
use uuid::Uuid;

use crate::coordinator::JobMetrics;
use crate::error::EngineError;

pub type JobId = Uuid;

/// Lifecycle state of a job.
///
/// `Created -> Running -> {Completed, Failed, Cancelled}`. A created job can
/// also be cancelled before it ever runs. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

/// Which built-in vertex program a job runs, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Bfs {
        source: VertexId,
    },
    ConnectedComponents,
    PageRank {
        #[serde(default = "default_damping")]
        damping: f64,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        #[serde(default = "default_max_iterations")]
        max_iterations: u64,
    },
}

fn default_damping() -> f64 { 0.85 }
fn default_tolerance() -> f64 { 1e-4 }
fn default_max_iterations() -> u64 { 30 }
fn default_replication() -> u16 { 1 }

impl AlgorithmConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bfs { .. } => "bfs",
            Self::ConnectedComponents => "connected_components",
            Self::PageRank { .. } => "page_rank",
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if let Self::PageRank {
            damping,
            tolerance,
            max_iterations,
        } = self
        {
            if !(0.0..=1.0).contains(damping) {
                return Err(EngineError::InvalidConfig(format!(
                    "page_rank damping must be within [0, 1], got {damping}"
                )));
            }
            if !tolerance.is_finite() || *tolerance <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "page_rank tolerance must be positive, got {tolerance}"
                )));
            }
            if *max_iterations == 0 {
                return Err(EngineError::InvalidConfig(
                    "page_rank max_iterations must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Everything needed to create a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub algorithm: AlgorithmConfig,
    /// Name of a registered vertex dataset.
    pub vertices: String,
    /// Name of a registered edge dataset.
    pub edges: String,
    /// Partition count; falls back to the engine default.
    #[serde(default)]
    pub num_partitions: Option<u32>,
    #[serde(default = "default_replication")]
    pub replication_factor: u16,
}

impl JobConfig {
    pub fn new(
        algorithm: AlgorithmConfig,
        vertices: impl Into<String>,
        edges: impl Into<String>,
    ) -> Self {
        Self {
            algorithm,
            vertices: vertices.into(),
            edges: edges.into(),
            num_partitions: None,
            replication_factor: default_replication(),
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.num_partitions = Some(partitions);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }
}

/// Per-run overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Stop after this many supersteps even if vertices are still active.
    pub max_supersteps: Option<u64>,
}

/// Observable state of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub algorithm: String,
    pub state: JobState,
    /// Current or last superstep.
    pub superstep: Superstep,
    pub active_vertices: u64,
    /// Why the job failed or was cancelled.
    pub diagnostic: Option<String>,
    pub metrics: JobMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(job_id: JobId, algorithm: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            algorithm: algorithm.into(),
            state: JobState::Created,
            superstep: 0,
            active_vertices: 0,
            diagnostic: None,
            metrics: JobMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Final value of one vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub vertex: VertexId,
    pub value: serde_json::Value,
}

impl ResultRecord {
    /// The value decoded back into a program's vertex type.
    pub fn value_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            serde_json::Value::String(s) => write!(f, "{} {}", self.vertex, s),
            other => write!(f, "{} {}", self.vertex, other),
        }
    }
}
