//! Transport and coordination capabilities the engine is built on.
//!
//! The engine only ever talks to the traits in [`traits`]: a partitioned,
//! per-partition-ordered log for messages, a key-value store for vertex
//! snapshots and results, and a coordination primitive for leadership and
//! the barrier-advance counter. [`memory`] provides in-process
//! implementations, including an at-least-once log that replays publishes.

pub mod error;
pub mod memory;
pub mod message;
pub mod traits;

pub use error::TransportError;
pub use memory::{
    DeliveryMode, InMemoryCoordination, InMemoryLog, InMemoryLogFactory, InMemoryStateStore,
};
pub use message::{DedupKey, Envelope};
pub use traits::{Coordination, LogFactory, PartitionedLog, StateStore};
