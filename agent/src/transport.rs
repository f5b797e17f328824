//! Zenoh-backed transport plus the offline fallback.

use anyhow::{anyhow, Result};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use v2x_env::{EnvError, InboundPacket, Mailbox, NetworkTransport, NodeId, OfflineTransport, V2xContext};
use zenoh::pubsub::Subscriber;

/// Loads a Zenoh session config, or the default peer config.
pub fn zenoh_config(path: Option<&Path>) -> Result<zenoh::Config> {
    match path {
        Some(path) => zenoh::Config::from_file(path).map_err(|e| anyhow!("invalid zenoh config {}: {}", path.display(), e)),
        None => Ok(zenoh::Config::default()),
    }
}

/// Vehicle topic over a Zenoh session.
///
/// The subscriber callback only pushes into the mailbox; a background task
/// owns the `put` calls so `publish` never waits on the network.
pub struct ZenohTransport {
    local_id: NodeId,
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: Mailbox<InboundPacket>,
    _subscriber: Subscriber<()>,
}

impl ZenohTransport {
    pub async fn connect<Ctx: V2xContext>(
        context: &Ctx,
        config: zenoh::Config,
        topic: &str,
        capacity: usize,
    ) -> Result<Self> {
        let session = zenoh::open(config)
            .await
            .map_err(|e| anyhow!("failed to open zenoh session: {}", e))?;

        let inbound = Mailbox::new(capacity);
        let deliver = inbound.sender();
        let subscriber = session
            .declare_subscriber(topic.to_string())
            .callback(move |sample| {
                let payload = sample.payload().to_bytes().into_owned();
                // A full mailbox counts the drop itself
                let _ = deliver.push(InboundPacket::new(payload));
            })
            .await
            .map_err(|e| anyhow!("failed to subscribe to {}: {}", topic, e))?;

        let (outbound, mut queue) = mpsc::channel::<Vec<u8>>(capacity.max(1));
        let key = topic.to_string();
        context.spawn("zenoh-publisher", async move {
            while let Some(payload) = queue.recv().await {
                if let Err(e) = session.put(key.as_str(), payload).await {
                    debug!(error = %e, "zenoh put failed");
                }
            }
        });

        let local_id = NodeId::new();
        info!(node = %local_id, topic, "zenoh session open");
        Ok(Self {
            local_id,
            outbound,
            inbound,
            _subscriber: subscriber,
        })
    }
}

impl NetworkTransport for ZenohTransport {
    fn publish(&self, payload: Vec<u8>) -> Result<(), EnvError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => EnvError::QueueFull(self.outbound.max_capacity()),
            TrySendError::Closed(_) => EnvError::network("zenoh publisher stopped"),
        })
    }

    fn drain_inbound(&self) -> Vec<InboundPacket> {
        self.inbound.drain()
    }

    fn dropped_inbound(&self) -> u64 {
        self.inbound.dropped()
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}

/// Whichever transport the agent ended up with.
pub enum AgentTransport {
    Zenoh(ZenohTransport),
    Offline(OfflineTransport),
}

impl NetworkTransport for AgentTransport {
    fn publish(&self, payload: Vec<u8>) -> Result<(), EnvError> {
        match self {
            AgentTransport::Zenoh(transport) => transport.publish(payload),
            AgentTransport::Offline(transport) => transport.publish(payload),
        }
    }

    fn drain_inbound(&self) -> Vec<InboundPacket> {
        match self {
            AgentTransport::Zenoh(transport) => transport.drain_inbound(),
            AgentTransport::Offline(transport) => transport.drain_inbound(),
        }
    }

    fn dropped_inbound(&self) -> u64 {
        match self {
            AgentTransport::Zenoh(transport) => transport.dropped_inbound(),
            AgentTransport::Offline(transport) => transport.dropped_inbound(),
        }
    }

    fn local_id(&self) -> NodeId {
        match self {
            AgentTransport::Zenoh(transport) => transport.local_id(),
            AgentTransport::Offline(transport) => transport.local_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_variant_delegates() {
        let transport = AgentTransport::Offline(OfflineTransport::new("no broker"));
        assert!(transport.publish(vec![1, 2, 3]).is_err());
        assert!(transport.drain_inbound().is_empty());
        assert_eq!(transport.dropped_inbound(), 0);
    }

    #[test]
    fn test_missing_zenoh_config_file_is_an_error() {
        assert!(zenoh_config(Some(Path::new("/nonexistent/zenoh.json5"))).is_err());
        assert!(zenoh_config(None).is_ok());
    }
}
