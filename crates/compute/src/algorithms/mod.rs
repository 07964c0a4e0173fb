//! Built-in vertex programs.

pub mod bfs;
pub mod connected_components;
pub mod pagerank;

pub use bfs::{BreadthFirstSearch, UNVISITED};
pub use connected_components::ConnectedComponents;
pub use pagerank::PageRank;
