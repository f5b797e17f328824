//! Common types for the V2X environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a transport endpoint.
///
/// This names the network attachment, not a vehicle: vehicle identity is
/// the string id carried inside each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Creates a new random NodeId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic NodeId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A raw message delivered by the pub/sub layer.
///
/// The payload is opaque here; the vehicle codec decides what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    /// Publishing endpoint, when the transport knows it
    pub source: Option<NodeId>,

    /// Raw message bytes
    pub payload: Vec<u8>,
}

impl InboundPacket {
    /// Creates a packet with an unknown source.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            source: None,
            payload,
        }
    }

    /// Creates a packet tagged with its publishing endpoint.
    pub fn from_node(source: NodeId, payload: Vec<u8>) -> Self {
        Self {
            source: Some(source),
            payload,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
