use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid partition count: {0} (must be between 1 and {max})", max = crate::partition::MAX_PARTITIONS)]
    InvalidPartitionCount(u32),
}
