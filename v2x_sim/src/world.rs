//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::network::{BusMessage, Delivery, SimNetwork, SimNetworkController};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use v2x_core::{
    AgentConfig, Color, Motion, ReplicationStore, RoadConfig, VehicleAgent, VehicleId, VehicleState,
};
use v2x_env::{InboundPacket, MailboxSender, NodeId, V2xContext};

/// Agent type every simulated vehicle runs.
pub type SimAgent = VehicleAgent<SimContext, SimNetwork>;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of agents spawned by `spawn_agents`
    pub num_agents: usize,

    pub tick_rate_hz: u32,

    /// Maximum simulation duration in seconds (0 = unlimited)
    pub max_duration_secs: f64,

    pub road: RoadConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 6,
            tick_rate_hz: 30,
            max_duration_secs: 60.0,
            road: RoadConfig::default(),
        }
    }
}

/// Where and how fast a new agent's car starts.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub vehicle_id: String,
    pub lane: u8,
    pub position: f64,
    pub speed: f64,

    /// Driver's cruise speed; defaults to the road's cruise speed
    pub cruise: Option<f64>,
}

impl SpawnSpec {
    pub fn new(vehicle_id: impl Into<String>, lane: u8, position: f64, speed: f64) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            lane,
            position,
            speed,
            cruise: None,
        }
    }

    pub fn with_cruise(mut self, cruise: f64) -> Self {
        self.cruise = Some(cruise);
        self
    }
}

/// Bus counters since the world was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusMetrics {
    pub published: u64,
    pub delivered: u64,
    pub dropped_partition: u64,
    pub dropped_loss: u64,
    pub dropped_mailbox: u64,
    pub max_latency_ms: u64,
}

impl BusMetrics {
    pub fn dropped(&self) -> u64 {
        self.dropped_partition + self.dropped_loss + self.dropped_mailbox
    }
}

/// Handle to a simulated agent.
pub struct AgentHandle {
    pub id: NodeId,
    pub agent: SimAgent,

    /// Sender the router delivers into
    inbox: MailboxSender<InboundPacket>,
}

/// A routed message waiting out its link delay.
struct InFlight {
    deliver_at: Duration,
    from: NodeId,
    to: NodeId,
    payload: Vec<u8>,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    pub network_controller: SimNetworkController,

    agents: BTreeMap<NodeId, AgentHandle>,

    /// Central router sender (cloned into every SimNetwork)
    router_tx: mpsc::Sender<BusMessage>,

    router_rx: mpsc::Receiver<BusMessage>,

    in_flight: Vec<InFlight>,
    metrics: BusMetrics,
    next_node: u64,
    tick_count: u64,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        let context = SimContext::shared(config.seed);
        let network_controller = SimNetworkController::new(context.derive_rng(0x6e6574));

        let (router_tx, router_rx) = mpsc::channel::<BusMessage>(10000);

        Self {
            config,
            context,
            network_controller,
            agents: BTreeMap::new(),
            router_tx,
            router_rx,
            in_flight: Vec::new(),
            metrics: BusMetrics::default(),
            next_node: 0,
            tick_count: 0,
        }
    }

    /// Spawns `num_agents` cars spread over the driving lanes and the track.
    pub fn spawn_agents(&mut self) -> Vec<NodeId> {
        let road = self.config.road.clone();
        let driving_lanes: Vec<u8> = (0..road.lane_count).filter(|&lane| lane != road.service_lane).collect();
        let count = self.config.num_agents;
        let spacing = road.track_length / count.max(1) as f64;

        (0..count)
            .map(|i| {
                let lane = driving_lanes.get(i % driving_lanes.len().max(1)).copied().unwrap_or(0);
                let spec = SpawnSpec::new(format!("CAR{}", i + 1), lane, spacing * i as f64, road.default_cruise_speed);
                self.spawn_agent(spec)
            })
            .collect()
    }

    /// Spawns one agent with its car placed exactly as described.
    pub fn spawn_agent(&mut self, spec: SpawnSpec) -> NodeId {
        let node_id = NodeId::from_seed(self.next_node);
        self.next_node += 1;

        let network = Arc::new(SimNetwork::new(node_id, self.router_tx.clone(), 1024));
        let inbox = network.inbox();

        let road = &self.config.road;
        let color = self.context.with_rng(Color::random);
        let mut own = VehicleState::new(
            VehicleId::new(spec.vehicle_id.to_uppercase()),
            false,
            spec.lane.min(road.outer_lane()),
            Motion::new(spec.position, spec.speed),
            color,
            road,
        );
        if let Some(cruise) = spec.cruise {
            own.user_target_speed = cruise;
        }

        let config = AgentConfig::default()
            .with_vehicle_id(own.id.as_str())
            .with_road(road.clone());
        let config = AgentConfig {
            tick_rate_hz: self.config.tick_rate_hz,
            ..config
        };

        let agent = VehicleAgent::new(self.context.clone(), network, config, own);
        self.agents.insert(node_id, AgentHandle { id: node_id, agent, inbox });
        node_id
    }

    /// Disconnects an agent. Its in-flight messages still arrive at the others.
    pub fn remove_agent(&mut self, id: NodeId) -> Option<SimAgent> {
        let handle = self.agents.remove(&id)?;
        info!(node = %id, vehicle = %handle.agent.own().id, "agent disconnected");
        Some(handle.agent)
    }

    /// Advances simulation by one tick: clock, every agent, then the bus.
    pub fn tick(&mut self) {
        let dt = 1.0 / self.config.tick_rate_hz.max(1) as f64;
        self.context.advance_time(Duration::from_secs_f64(dt));

        for handle in self.agents.values_mut() {
            handle.agent.tick();
        }

        self.process_network();
        self.tick_count += 1;
    }

    /// Runs whole ticks covering `secs` of virtual time.
    pub fn run_for(&mut self, secs: f64) {
        let ticks = (secs * self.config.tick_rate_hz as f64).round() as u64;
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Publishes raw bytes on the bus as if `from` had sent them.
    pub fn inject(&mut self, from: NodeId, payload: Vec<u8>) {
        // The router queue is drained every tick, so a full queue means a bug here
        if self.router_tx.try_send(BusMessage { from, payload }).is_err() {
            debug!(node = %from, "router queue full, injected message dropped");
        }
    }

    /// Routes everything published since the last call, then delivers what is due.
    pub fn process_network(&mut self) {
        let now = self.context.now();

        while let Ok(msg) = self.router_rx.try_recv() {
            self.metrics.published += 1;

            // Every subscriber gets a copy, including the publisher itself
            for &to in self.agents.keys() {
                match self.network_controller.route(msg.from, to) {
                    Delivery::Partitioned => self.metrics.dropped_partition += 1,
                    Delivery::Lost => self.metrics.dropped_loss += 1,
                    Delivery::After(delay) => {
                        self.metrics.max_latency_ms = self.metrics.max_latency_ms.max(delay.as_millis() as u64);
                        self.in_flight.push(InFlight {
                            deliver_at: now + delay,
                            from: msg.from,
                            to,
                            payload: msg.payload.clone(),
                        });
                    }
                }
            }
        }

        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|flight| flight.deliver_at <= now);
        self.in_flight = pending;
        due.sort_by_key(|flight| flight.deliver_at);

        for flight in due {
            let Some(handle) = self.agents.get(&flight.to) else {
                continue;
            };
            match handle.inbox.push(InboundPacket::from_node(flight.from, flight.payload)) {
                Ok(()) => self.metrics.delivered += 1,
                Err(_) => self.metrics.dropped_mailbox += 1,
            }
        }
    }

    pub fn agent(&self, id: NodeId) -> Option<&SimAgent> {
        self.agents.get(&id).map(|handle| &handle.agent)
    }

    pub fn agent_mut(&mut self, id: NodeId) -> Option<&mut SimAgent> {
        self.agents.get_mut(&id).map(|handle| &mut handle.agent)
    }

    /// Agents in node id order.
    pub fn agents(&self) -> impl Iterator<Item = &SimAgent> {
        self.agents.values().map(|handle| &handle.agent)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.agents.keys().copied().collect()
    }

    /// Every agent's replication store, for the oracle.
    pub fn stores(&self) -> Vec<&ReplicationStore> {
        self.agents().map(|agent| agent.store()).collect()
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    /// Current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2x_env::NetworkController;

    fn world(num_agents: usize) -> SimWorld {
        SimWorld::new(SimConfig {
            seed: 42,
            num_agents,
            ..Default::default()
        })
    }

    #[test]
    fn test_sim_world_creation() {
        let mut world = world(3);
        let ids = world.spawn_agents();

        assert_eq!(ids.len(), 3);
        assert_eq!(world.agent_count(), 3);

        let lanes: Vec<u8> = world.agents().map(|agent| agent.own().lane).collect();
        assert_eq!(lanes, vec![0, 1, 2]);
        assert!(world.agents().all(|agent| agent.own().lane != world.config.road.service_lane));
    }

    #[test]
    fn test_sim_world_tick() {
        let mut world = world(1);

        assert_eq!(world.tick_count(), 0);
        assert_eq!(world.time(), 0.0);

        world.tick();

        assert_eq!(world.tick_count(), 1);
        assert!((world.time() - 1.0 / 30.0).abs() < 0.0001);
    }

    #[test]
    fn test_agents_learn_about_each_other() {
        let mut world = world(4);
        world.spawn_agents();
        world.run_for(0.5);

        for agent in world.agents() {
            assert_eq!(agent.store().len(), 4, "{} is missing peers", agent.own().id);
        }
        // Echoes come back to each publisher
        assert!(world.agents().all(|agent| agent.stats().ignored_own > 0));
        assert_eq!(world.metrics().dropped(), 0);
    }

    #[test]
    fn test_partition_blocks_cross_traffic() {
        let mut world = world(2);
        let ids = world.spawn_agents();
        world.network_controller.partition(&ids[..1], &ids[1..]);
        world.run_for(1.0);

        assert!(world.agents().all(|agent| agent.store().len() == 1));
        assert!(world.metrics().dropped_partition > 0);
    }

    #[test]
    fn test_latency_delays_delivery() {
        let mut world = world(2);
        let ids = world.spawn_agents();
        world.network_controller.set_link_latency(ids[0], ids[1], 500);

        world.run_for(0.3);
        assert!(!world.agent(ids[1]).unwrap().store().contains("CAR1"));

        world.run_for(0.4);
        assert!(world.agent(ids[1]).unwrap().store().contains("CAR1"));
        assert_eq!(world.metrics().max_latency_ms, 500);
    }

    #[test]
    fn test_removed_agent_becomes_ghost() {
        let mut world = world(3);
        let ids = world.spawn_agents();
        world.run_for(0.5);

        let removed = world.remove_agent(ids[2]).unwrap();
        assert_eq!(removed.own().id.as_str(), "CAR3");
        world.run_for(3.5);

        assert!(world.agents().all(|agent| !agent.store().contains("CAR3")));
        assert_eq!(world.agent_count(), 2);
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = || {
            let mut world = world(4);
            world.spawn_agents();
            world.run_for(2.0);
            world.agents().map(|agent| agent.own().position).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
