use std::sync::Arc;

use chrono::Utc;
use superstep_core::{Edge, GraphMeta, Partitioner};
use superstep_graph::{partition_graph, EdgeList, PartitionedGraph, VertexRecord};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::aggregator::AggregatorRegistry;
use crate::coordinator::{Coordinator, JobContext};
use crate::error::EngineError;
use crate::program::VertexProgram;

use super::job::JobState;

/// Type-erased entry point for one vertex program, so the job manager can
/// hold jobs of different programs side by side.
pub(crate) trait JobDriver: Send + Sync {
    fn program_name(&self) -> &str;

    /// Check that the program's aggregators register and that the datasets
    /// decode into a valid graph.
    fn validate(
        &self,
        partitioner: Partitioner,
        vertices: &[VertexRecord],
        edges: &[EdgeList],
    ) -> Result<GraphMeta, EngineError>;

    /// Load the graph and run the coordinator on a new task.
    fn launch(
        &self,
        ctx: JobContext,
        partitioner: Partitioner,
        vertices: Arc<Vec<VertexRecord>>,
        edges: Arc<Vec<EdgeList>>,
    ) -> JoinHandle<()>;
}

pub(crate) struct ProgramDriver<P> {
    program: Arc<P>,
}

impl<P: VertexProgram> ProgramDriver<P> {
    pub(crate) fn new(program: P) -> Self {
        Self {
            program: Arc::new(program),
        }
    }
}

impl<P: VertexProgram> JobDriver for ProgramDriver<P> {
    fn program_name(&self) -> &str {
        self.program.name()
    }

    fn validate(
        &self,
        partitioner: Partitioner,
        vertices: &[VertexRecord],
        edges: &[EdgeList],
    ) -> Result<GraphMeta, EngineError> {
        AggregatorRegistry::from_specs(self.program.aggregators())?;
        Ok(decode_graph(&*self.program, partitioner, vertices, edges)?.meta)
    }

    fn launch(
        &self,
        ctx: JobContext,
        partitioner: Partitioner,
        vertices: Arc<Vec<VertexRecord>>,
        edges: Arc<Vec<EdgeList>>,
    ) -> JoinHandle<()> {
        let program = Arc::clone(&self.program);
        tokio::spawn(async move {
            let prepared = AggregatorRegistry::from_specs(program.aggregators())
                .map_err(EngineError::from)
                .and_then(|registry| {
                    decode_graph(&*program, partitioner, &vertices, &edges)
                        .map(|graph| (registry, graph))
                });
            match prepared {
                Ok((registry, graph)) => {
                    let job = ctx.job_id;
                    if let Ok(termination) = Coordinator::new(ctx, program, registry).run(graph).await {
                        debug!(%job, ?termination, "coordinator finished");
                    }
                }
                Err(e) => {
                    error!(job = %ctx.job_id, error = %e, "could not load graph");
                    let diagnostic = e.to_string();
                    ctx.status.send_modify(|s| {
                        s.state = JobState::Failed;
                        s.diagnostic = Some(diagnostic);
                        s.updated_at = Utc::now();
                    });
                }
            }
        })
    }
}

/// Decode raw dataset values with the program and split the graph across
/// partitions.
fn decode_graph<P: VertexProgram>(
    program: &P,
    partitioner: Partitioner,
    vertices: &[VertexRecord],
    edges: &[EdgeList],
) -> Result<PartitionedGraph<P::Value, P::EdgeValue>, EngineError> {
    let meta = GraphMeta {
        vertex_count: vertices.len() as u64,
        edge_count: edges.iter().map(|list| list.edges.len() as u64).sum(),
        num_partitions: partitioner.num_partitions(),
    };

    let typed_vertices = vertices
        .iter()
        .map(|record| {
            program
                .initial_value(record.id, &record.value, &meta)
                .map(|value| (record.id, value))
                .map_err(|e| EngineError::MalformedDataset(format!("vertex {}: {e}", record.id)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let typed_edges = edges
        .iter()
        .map(|list| {
            list.edges
                .iter()
                .map(|edge| program.edge_value(&edge.value).map(|v| Edge::new(edge.target, v)))
                .collect::<Result<Vec<_>, _>>()
                .map(|decoded| (list.source, decoded))
                .map_err(|e| {
                    EngineError::MalformedDataset(format!("edges of vertex {}: {e}", list.source))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    partition_graph(partitioner, typed_vertices, typed_edges)
        .map_err(|e| EngineError::MalformedDataset(e.to_string()))
}
