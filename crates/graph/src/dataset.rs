//! Input records of the two externally populated datasets: vertices with
//! their raw initial values, and edge lists grouped by source vertex.
//!
//! Values are untyped JSON; the vertex program decides how to read them.

use serde::{Deserialize, Serialize};
use superstep_core::VertexId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: VertexId,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl VertexRecord {
    pub fn new(id: VertexId, value: impl Into<serde_json::Value>) -> Self {
        Self { id, value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub target: VertexId,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// All outgoing edges of one source vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeList {
    pub source: VertexId,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

impl EdgeList {
    /// Edge list with null edge values.
    pub fn unweighted(source: VertexId, targets: impl IntoIterator<Item = VertexId>) -> Self {
        Self {
            source,
            edges: targets
                .into_iter()
                .map(|target| EdgeRecord {
                    target,
                    value: serde_json::Value::Null,
                })
                .collect(),
        }
    }
}
