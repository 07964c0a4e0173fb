use superstep_core::PartitionId;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by transport and coordination backends.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("partition {partition} out of range (log has {partitions} partitions)")]
    UnknownPartition { partition: PartitionId, partitions: u32 },

    #[error("leadership of '{key}' is held by {holder}")]
    LeadershipHeld { key: String, holder: Uuid },

    #[error("leadership of '{key}' is not held by {holder}")]
    LeadershipNotHeld { key: String, holder: Uuid },

    #[error("invalid log settings: {0}")]
    InvalidLog(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}
