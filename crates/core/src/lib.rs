pub mod config;
pub mod entity;
pub mod error;
pub mod partition;

pub use config::EngineConfig;
pub use entity::*;
pub use error::*;
pub use partition::Partitioner;
