pub mod dataset;
pub mod error;
pub mod load;
pub mod store;

pub use dataset::{EdgeList, EdgeRecord, VertexRecord};
pub use error::GraphError;
pub use load::{partition_graph, PartitionedGraph};
pub use store::{PartitionStats, PartitionStore};
