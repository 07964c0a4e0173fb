use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use superstep_core::{PartitionId, Superstep, VertexId};

/// Identity of one logical message: (sender partition, send superstep, sequence).
pub type DedupKey = (PartitionId, Superstep, u64);

/// Wire-format envelope for a vertex message on the partitioned log.
///
/// The payload is MessagePack-encoded. `superstep` is the superstep in which
/// the message was *sent*; it is consumed in `superstep + 1`. `sequence` is
/// assigned by the sending partition and restarts at zero every superstep,
/// so `(sender, superstep, sequence)` uniquely names a logical message even
/// when the log redelivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: PartitionId,
    pub superstep: Superstep,
    pub sequence: u64,
    pub target: VertexId,

    /// MessagePack-encoded payload bytes.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// When the sender built this envelope.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create a new envelope, serializing the payload with MessagePack.
    pub fn new<T: Serialize>(
        sender: PartitionId,
        superstep: Superstep,
        sequence: u64,
        target: VertexId,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            sender,
            superstep,
            sequence,
            target,
            payload: rmp_serde::to_vec(payload)?,
            timestamp: Utc::now(),
        })
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    pub fn dedup_key(&self) -> DedupKey {
        (self.sender, self.superstep, self.sequence)
    }

    /// Serialize this entire envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
