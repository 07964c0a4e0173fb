//! superstep-run: run one job described by a TOML file on the in-process
//! engine and print `vertex value` lines for the result.
//!
//! The file carries the job config plus the two datasets it names:
//!
//! ```toml
//! [job]
//! vertices = "graph"
//! edges = "graph"
//! num_partitions = 4
//! algorithm = { type = "bfs", source = 0 }
//!
//! [[vertices]]
//! id = 0
//!
//! [[edges]]
//! source = 0
//! edges = [{ target = 1 }]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use superstep_compute::{JobConfig, JobManager, JobState, RunOptions};
use superstep_core::EngineConfig;
use superstep_graph::{EdgeList, VertexRecord};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run a bulk-synchronous graph job and print its result.
#[derive(Parser, Debug)]
#[command(name = "superstep-run", version, about)]
struct Cli {
    /// Path to the job TOML file.
    #[arg(long, env = "SUPERSTEP_JOB")]
    job: PathBuf,

    /// Stop after this many supersteps.
    #[arg(long)]
    max_supersteps: Option<u64>,

    /// Give up waiting for the job after this many seconds.
    #[arg(long, env = "SUPERSTEP_RUN_TIMEOUT", default_value_t = 300)]
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct JobFile {
    job: JobConfig,
    #[serde(default)]
    vertices: Vec<VertexRecord>,
    #[serde(default)]
    edges: Vec<EdgeList>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    config.log_summary();

    let raw = std::fs::read_to_string(&cli.job)
        .with_context(|| format!("reading {}", cli.job.display()))?;
    let file: JobFile =
        toml::from_str(&raw).with_context(|| format!("parsing {}", cli.job.display()))?;
    info!(
        path = %cli.job.display(),
        algorithm = file.job.algorithm.name(),
        vertices = file.vertices.len(),
        edge_lists = file.edges.len(),
        "loaded job file"
    );

    let manager = JobManager::in_memory(config);
    manager
        .register_vertices(file.job.vertices.clone(), file.vertices)
        .await;
    manager.register_edges(file.job.edges.clone(), file.edges).await;

    let job = manager.create(file.job).await?;
    manager
        .run(
            job,
            RunOptions {
                max_supersteps: cli.max_supersteps,
            },
        )
        .await?;
    let status = manager
        .wait(job, Duration::from_secs(cli.timeout_secs))
        .await?;

    if status.state != JobState::Completed {
        bail!(
            "job {} ended {}: {}",
            job,
            status.state,
            status.diagnostic.as_deref().unwrap_or("no diagnostic")
        );
    }
    info!(
        supersteps = status.metrics.supersteps_completed,
        messages = status.metrics.total_messages,
        "job completed"
    );
    for record in manager.result(job).await? {
        println!("{record}");
    }
    Ok(())
}
