//! Simulated pub/sub bus with fault injection.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use v2x_env::{EnvError, InboundPacket, Mailbox, MailboxSender, NetworkController, NetworkTransport, NodeId};

/// One message published on the bus, before routing.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub from: NodeId,
    pub payload: Vec<u8>,
}

/// Simulated network interface for an agent.
pub struct SimNetwork {
    local_id: NodeId,

    /// Sender to central router
    tx: mpsc::Sender<BusMessage>,

    /// Messages routed to this node, drained by the agent
    inbox: Mailbox<InboundPacket>,
}

impl SimNetwork {
    pub fn new(local_id: NodeId, tx: mpsc::Sender<BusMessage>, inbox_capacity: usize) -> Self {
        Self {
            local_id,
            tx,
            inbox: Mailbox::new(inbox_capacity),
        }
    }

    /// Creates a stub network for testing (publishes go nowhere).
    pub fn new_stub(local_id: NodeId) -> Self {
        let (tx, _) = mpsc::channel(1);
        Self::new(local_id, tx, 16)
    }

    /// Handle the router uses to deliver into this node.
    pub fn inbox(&self) -> MailboxSender<InboundPacket> {
        self.inbox.sender()
    }
}

impl NetworkTransport for SimNetwork {
    fn publish(&self, payload: Vec<u8>) -> Result<(), EnvError> {
        let msg = BusMessage {
            from: self.local_id,
            payload,
        };

        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => EnvError::QueueFull(self.tx.max_capacity()),
            TrySendError::Closed(_) => EnvError::network("Router closed"),
        })
    }

    fn drain_inbound(&self) -> Vec<InboundPacket> {
        self.inbox.drain()
    }

    fn dropped_inbound(&self) -> u64 {
        self.inbox.dropped()
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}

/// Routing verdict for one (sender, receiver) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Deliver after this delay
    After(Duration),
    Partitioned,
    Lost,
}

/// Network controller for fault injection.
pub struct SimNetworkController {
    /// Per-link latency in milliseconds
    link_latency: Arc<Mutex<HashMap<(NodeId, NodeId), u64>>>,

    /// Per-link packet loss rate (0.0 - 1.0)
    link_loss: Arc<Mutex<HashMap<(NodeId, NodeId), f64>>>,

    /// Active partitions (nodes that cannot communicate)
    partitions: Arc<Mutex<Vec<(Vec<NodeId>, Vec<NodeId>)>>>,

    /// Uniform extra delay in `[0, jitter_ms]` added to every delivery
    jitter_ms: Arc<Mutex<u64>>,

    /// Seeded RNG for loss and jitter draws
    rng: Mutex<ChaCha8Rng>,
}

impl SimNetworkController {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            link_latency: Arc::new(Mutex::new(HashMap::new())),
            link_loss: Arc::new(Mutex::new(HashMap::new())),
            partitions: Arc::new(Mutex::new(Vec::new())),
            jitter_ms: Arc::new(Mutex::new(0)),
            rng: Mutex::new(rng),
        }
    }

    pub fn set_jitter(&self, jitter_ms: u64) {
        *self.jitter_ms.lock().unwrap() = jitter_ms;
    }

    /// Checks if two nodes can communicate (not partitioned).
    pub fn can_communicate(&self, from: NodeId, to: NodeId) -> bool {
        let partitions = self.partitions.lock().unwrap();

        for (group_a, group_b) in partitions.iter() {
            let from_in_a = group_a.contains(&from);
            let from_in_b = group_b.contains(&from);
            let to_in_a = group_a.contains(&to);
            let to_in_b = group_b.contains(&to);

            // Partitioned if one is in A and other in B (or vice versa)
            if (from_in_a && to_in_b) || (from_in_b && to_in_a) {
                return false;
            }
        }

        true
    }

    /// Gets the latency for a link (default 0).
    pub fn get_latency(&self, from: NodeId, to: NodeId) -> u64 {
        let latencies = self.link_latency.lock().unwrap();
        *latencies.get(&(from, to)).unwrap_or(&0)
    }

    /// Gets the loss rate for a link (default 0.0).
    pub fn get_loss(&self, from: NodeId, to: NodeId) -> f64 {
        let losses = self.link_loss.lock().unwrap();
        *losses.get(&(from, to)).unwrap_or(&0.0)
    }

    /// Decides the fate of one message on the `from -> to` link.
    pub fn route(&self, from: NodeId, to: NodeId) -> Delivery {
        if !self.can_communicate(from, to) {
            return Delivery::Partitioned;
        }

        let loss = self.get_loss(from, to);
        let jitter = *self.jitter_ms.lock().unwrap();
        let mut rng = self.rng.lock().unwrap();

        if loss > 0.0 && rng.gen_bool(loss) {
            return Delivery::Lost;
        }
        let extra = if jitter > 0 { rng.gen_range(0..=jitter) } else { 0 };
        Delivery::After(Duration::from_millis(self.get_latency(from, to) + extra))
    }
}

impl NetworkController for SimNetworkController {
    fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]) {
        let mut partitions = self.partitions.lock().unwrap();
        partitions.push((group_a.to_vec(), group_b.to_vec()));
    }

    fn heal_all(&self) {
        let mut partitions = self.partitions.lock().unwrap();
        partitions.clear();
    }

    fn set_link_latency(&self, from: NodeId, to: NodeId, latency_ms: u64) {
        let mut latencies = self.link_latency.lock().unwrap();
        latencies.insert((from, to), latency_ms);
    }

    fn set_link_loss(&self, from: NodeId, to: NodeId, loss_rate: f64) {
        let mut losses = self.link_loss.lock().unwrap();
        losses.insert((from, to), loss_rate.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn controller() -> SimNetworkController {
        SimNetworkController::new(ChaCha8Rng::seed_from_u64(42))
    }

    #[test]
    fn test_network_controller_partition() {
        let controller = controller();

        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);
        let c = NodeId::from_seed(3);

        assert!(controller.can_communicate(a, b));
        assert!(controller.can_communicate(a, c));
        assert!(controller.can_communicate(b, c));

        // Partition: {a} vs {b, c}
        controller.partition(&[a], &[b, c]);

        assert!(!controller.can_communicate(a, b));
        assert!(!controller.can_communicate(c, a));
        assert_eq!(controller.route(a, b), Delivery::Partitioned);

        // But b and c can still talk, and a still hears itself
        assert!(controller.can_communicate(b, c));
        assert!(controller.can_communicate(a, a));

        controller.heal_all();
        assert!(controller.can_communicate(a, b));
    }

    #[test]
    fn test_network_controller_latency() {
        let controller = controller();

        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);

        assert_eq!(controller.get_latency(a, b), 0);
        assert_eq!(controller.route(a, b), Delivery::After(Duration::ZERO));

        controller.set_link_latency(a, b, 100);
        assert_eq!(controller.route(a, b), Delivery::After(Duration::from_millis(100)));

        // Reverse direction is separate
        assert_eq!(controller.get_latency(b, a), 0);
    }

    #[test]
    fn test_loss_extremes() {
        let controller = controller();
        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);

        controller.set_link_loss(a, b, 7.0);
        assert_eq!(controller.get_loss(a, b), 1.0);
        assert!((0..50).all(|_| controller.route(a, b) == Delivery::Lost));

        controller.set_link_loss(a, b, 0.0);
        assert!((0..50).all(|_| controller.route(a, b) != Delivery::Lost));
    }

    #[test]
    fn test_jitter_bounds() {
        let controller = controller();
        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);
        controller.set_link_latency(a, b, 20);
        controller.set_jitter(30);

        for _ in 0..200 {
            match controller.route(a, b) {
                Delivery::After(delay) => {
                    assert!(delay >= Duration::from_millis(20));
                    assert!(delay <= Duration::from_millis(50));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_sim_network_publish_and_inbox() {
        let (tx, mut rx) = mpsc::channel(4);
        let node = NodeId::from_seed(9);
        let net = SimNetwork::new(node, tx, 2);

        net.publish(b"hello".to_vec()).unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.from, node);
        assert_eq!(msg.payload, b"hello");

        let inbox = net.inbox();
        inbox.push(InboundPacket::new(vec![1])).unwrap();
        inbox.push(InboundPacket::new(vec![2])).unwrap();
        assert!(inbox.push(InboundPacket::new(vec![3])).is_err());

        assert_eq!(net.drain_inbound().len(), 2);
        assert_eq!(net.dropped_inbound(), 1);
    }

    #[test]
    fn test_stub_publish_fails_cleanly() {
        let net = SimNetwork::new_stub(NodeId::from_seed(1));
        assert!(net.publish(vec![0]).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_route_delay_stays_within_latency_plus_jitter(
                seed in any::<u64>(),
                latency in 0u64..500,
                jitter in 0u64..300,
                loss in 0.0f64..=1.0,
            ) {
                let controller = SimNetworkController::new(ChaCha8Rng::seed_from_u64(seed));
                let (a, b) = (NodeId::from_seed(1), NodeId::from_seed(2));
                controller.set_link_latency(a, b, latency);
                controller.set_link_loss(a, b, loss);
                controller.set_jitter(jitter);

                for _ in 0..20 {
                    match controller.route(a, b) {
                        Delivery::After(delay) => {
                            prop_assert!(loss < 1.0);
                            let ms = delay.as_millis() as u64;
                            prop_assert!(ms >= latency && ms <= latency + jitter);
                        }
                        Delivery::Lost => prop_assert!(loss > 0.0),
                        Delivery::Partitioned => prop_assert!(false, "no partition was set"),
                    }
                }
            }

            #[test]
            fn prop_same_seed_routes_identically(seed in any::<u64>(), loss in 0.0f64..=1.0) {
                let (a, b) = (NodeId::from_seed(1), NodeId::from_seed(2));
                let run = || {
                    let controller = SimNetworkController::new(ChaCha8Rng::seed_from_u64(seed));
                    controller.set_link_loss(a, b, loss);
                    controller.set_jitter(50);
                    (0..32).map(|_| controller.route(a, b)).collect::<Vec<_>>()
                };
                prop_assert_eq!(run(), run());
            }
        }
    }
}
