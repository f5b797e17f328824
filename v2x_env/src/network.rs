//! Pub/sub transport abstraction for V2X agents.

use crate::error::EnvError;
use crate::types::{InboundPacket, NodeId};

/// Abstraction for the publish/subscribe channel shared by all agents.
///
/// # Implementations
///
/// - **Production**: Zenoh session (publisher task + subscriber callback)
/// - **Simulation**: In-memory bus with configurable latency/loss/partitions
/// - **Offline**: `OfflineTransport`, single-agent operation
///
/// # Packet Flow
///
/// ```text
/// Agent A                    Broker                     Agent B
///   |                           |                          |
///   |-- publish(state) -------->|                          |
///   |                           |-- [delivery callback] -->| mailbox.push
///   |                           |                          |
///   |                           |            next tick --->| drain_inbound()
/// ```
///
/// Both methods are non-blocking so they can be called from the tick loop.
pub trait NetworkTransport: Send + Sync + 'static {
    /// Hands one message to the transport for broadcast on the vehicle topic.
    ///
    /// # Returns
    /// * `Ok(())` - Message accepted (delivery is not guaranteed)
    /// * `Err(EnvError)` - Immediate failure; the caller logs and carries on
    fn publish(&self, payload: Vec<u8>) -> Result<(), EnvError>;

    /// Removes and returns every message delivered since the last call.
    fn drain_inbound(&self) -> Vec<InboundPacket>;

    /// Number of inbound messages dropped because the mailbox was full.
    fn dropped_inbound(&self) -> u64 {
        0
    }

    /// Returns this endpoint's ID.
    fn local_id(&self) -> NodeId;
}

/// Fault injection for simulated networks.
pub trait NetworkController: Send + Sync {
    /// Creates a network partition between two node sets.
    fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]);

    /// Heals all partitions.
    fn heal_all(&self);

    /// Sets latency for a specific link.
    fn set_link_latency(&self, from: NodeId, to: NodeId, latency_ms: u64);

    /// Sets packet loss probability for a link (0.0 - 1.0).
    fn set_link_loss(&self, from: NodeId, to: NodeId, loss_rate: f64);
}
