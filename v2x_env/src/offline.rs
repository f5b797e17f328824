//! Transport used when no broker is reachable.

use crate::error::EnvError;
use crate::network::NetworkTransport;
use crate::types::{InboundPacket, NodeId};

/// A transport that never delivers anything.
///
/// Publishing always fails with [`EnvError::Unavailable`], so the agent keeps
/// counting publish failures while it simulates on its own.
pub struct OfflineTransport {
    local_id: NodeId,
    reason: String,
}

impl OfflineTransport {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            local_id: NodeId::new(),
            reason: reason.into(),
        }
    }
}

impl NetworkTransport for OfflineTransport {
    fn publish(&self, _payload: Vec<u8>) -> Result<(), EnvError> {
        Err(EnvError::unavailable(self.reason.clone()))
    }

    fn drain_inbound(&self) -> Vec<InboundPacket> {
        Vec::new()
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}
