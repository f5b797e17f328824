//! Agent Runtime - one vehicle agent's tick loop.
//!
//! Ties the pure engines to the environment abstraction (`V2xContext` for
//! time, `NetworkTransport` for pub/sub).
//!
//! # Tick order
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. drain user commands        6. animate every visual lane   │
//! │ 2. read attention signal      7. publish owned vehicles      │
//! │ 3. count cooldowns down       8. drain + merge inbound       │
//! │ 4. decide + move own car      9. sweep ghosts                │
//! │ 5. decide + move ambulance                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 4-6 only ever see the store as it was at the end of the previous
//! tick plus our own writes; inbound messages land in one block at step 8.
//!
//! # Usage
//!
//! ```ignore
//! use v2x_core::{AgentConfig, VehicleAgent};
//! use v2x_env::TokioContext;
//!
//! let ctx = TokioContext::shared();
//! let mut agent = VehicleAgent::spawn(ctx, transport, AgentConfig::default(), &mut rand::thread_rng());
//! agent.run(&stop).await;
//! ```

use crate::animator::animate_lane;
use crate::attention::AttentionSignal;
use crate::codec::StateCodec;
use crate::config::AgentConfig;
use crate::decision::{decide, RuleKind};
use crate::kinematics::advance;
use crate::replication::{ApplyOutcome, ReplicationStore};
use crate::vehicle::{VehicleId, VehicleState};
use crate::view::{Dashboard, VehicleView};

use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use v2x_env::{Mailbox, MailboxSender, NetworkTransport, NodeId, V2xContext};

/// Longest time step a single tick will simulate.
pub const MAX_TICK_DT: f64 = 0.25;

/// Discrete driver commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserCommand {
    /// Move by this many lanes; ignored if it would leave the road
    ChangeLane(i8),

    /// Change the cruise speed by this many m/s, clamped to `[0, max_speed]`
    AdjustCruise(f64),

    /// Dispatch the shared emergency vehicle if nobody has
    SummonEmergency,

    /// Manual stand-in for the attention detector
    ToggleManualImpairment,
}

/// Counters kept by one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub ticks: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub applied: u64,
    pub materialized: u64,
    pub ignored_own: u64,
    pub ignored_emergency: u64,
    pub decode_failures: u64,
    pub ghosts_evicted: u64,
    pub dropped_inbound: u64,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub dt: f64,

    /// Rule that drove our own vehicle
    pub rule: RuleKind,

    pub inbound: usize,
    pub evicted: Vec<VehicleId>,
}

/// A vehicle agent.
///
/// Generic over the context and network implementations, so the same loop
/// runs against a real broker or inside the simulator.
pub struct VehicleAgent<Ctx, Net>
where
    Ctx: V2xContext,
    Net: NetworkTransport,
{
    context: Arc<Ctx>,
    network: Arc<Net>,
    config: AgentConfig,
    store: ReplicationStore,
    codec: StateCodec,
    attention: AttentionSignal,
    manual_impairment: bool,
    commands: Mailbox<UserCommand>,
    last_tick_at: Option<Duration>,
    stats: AgentStats,
    publish_healthy: bool,
}

impl<Ctx, Net> VehicleAgent<Ctx, Net>
where
    Ctx: V2xContext,
    Net: NetworkTransport,
{
    /// Creates an agent that owns `own`.
    pub fn new(context: Arc<Ctx>, network: Arc<Net>, config: AgentConfig, mut own: VehicleState) -> Self {
        own.last_seen_at = context.now();
        let store = ReplicationStore::new(own, &config.road);
        let codec = StateCodec::new(&config.road);
        let commands = Mailbox::new(config.mailbox_capacity);

        info!(
            vehicle = %store.own_id(),
            node = %network.local_id(),
            lane = store.own().lane,
            "agent started"
        );

        Self {
            context,
            network,
            config,
            store,
            codec,
            attention: AttentionSignal::new(),
            manual_impairment: false,
            commands,
            last_tick_at: None,
            stats: AgentStats::default(),
            publish_healthy: true,
        }
    }

    /// Creates an agent with a freshly spawned car named after `config.vehicle_id`.
    pub fn spawn<R: Rng + ?Sized>(context: Arc<Ctx>, network: Arc<Net>, config: AgentConfig, rng: &mut R) -> Self {
        let own = VehicleState::spawn_own(VehicleId::new(config.vehicle_id.clone()), rng, &config.road);
        Self::new(context, network, config, own)
    }

    /// Handle for queueing commands from another task or thread.
    pub fn command_sender(&self) -> MailboxSender<UserCommand> {
        self.commands.sender()
    }

    /// Handle the attention detector writes to.
    pub fn attention_signal(&self) -> AttentionSignal {
        self.attention.clone()
    }

    /// Detector value OR manual override.
    pub fn is_impaired(&self) -> bool {
        self.attention.is_impaired() || self.manual_impairment
    }

    /// Runs one tick using the context clock for `dt`.
    pub fn tick(&mut self) -> TickReport {
        let now = self.context.now();
        let dt = match self.last_tick_at {
            Some(previous) => now.saturating_sub(previous).as_secs_f64().min(MAX_TICK_DT),
            None => self.config.frame().as_secs_f64(),
        };
        self.last_tick_at = Some(now);
        self.step(dt, now)
    }

    fn step(&mut self, dt: f64, now: Duration) -> TickReport {
        for command in self.commands.drain() {
            self.apply_command(command, now);
        }
        let impaired = self.is_impaired();

        self.store.own_mut().tick_cooldown(dt);
        if let Some(emergency) = self.store.owned_emergency_mut() {
            emergency.tick_cooldown(dt);
        }

        let road = &self.config.road;

        let decision = decide(self.store.own(), self.store.iter(), impaired, road);
        let own = self.store.own_mut();
        decision.apply_to(own);
        own.set_motion(advance(own.motion(), own.target_speed, dt, road));
        own.last_seen_at = now;

        let emergency_decision = self
            .store
            .owned_emergency()
            .map(|emergency| decide(emergency, self.store.iter(), false, road));
        if let (Some(decision), Some(emergency)) = (emergency_decision, self.store.owned_emergency_mut()) {
            decision.apply_to(emergency);
            emergency.set_motion(advance(emergency.motion(), emergency.target_speed, dt, road));
            emergency.last_seen_at = now;
        }

        for vehicle in self.store.iter_mut() {
            vehicle.visual_lane = animate_lane(vehicle.visual_lane, vehicle.lane, road.lane_change_speed, dt);
        }

        self.publish_owned();
        let inbound = self.merge_inbound(now);

        let evicted = self.store.sweep_ghosts(now);
        self.stats.ghosts_evicted += evicted.len() as u64;
        self.stats.ticks += 1;

        TickReport {
            dt,
            rule: decision.rule,
            inbound,
            evicted,
        }
    }

    fn apply_command(&mut self, command: UserCommand, now: Duration) {
        let road = &self.config.road;
        match command {
            UserCommand::ChangeLane(delta) => {
                let own = self.store.own_mut();
                let lane = i64::from(own.lane) + i64::from(delta);
                if road.is_valid_lane(lane) {
                    own.lane = lane as u8;
                    debug!(lane, "manual lane change");
                }
            }
            UserCommand::AdjustCruise(delta) => {
                let own = self.store.own_mut();
                own.user_target_speed = (own.user_target_speed + delta).clamp(0.0, road.max_speed);
                debug!(cruise = own.user_target_speed, "cruise speed set");
            }
            UserCommand::SummonEmergency => {
                let emergency = VehicleState::spawn_emergency(road);
                if !self.store.claim_emergency(emergency, now) {
                    debug!("emergency vehicle already on the road");
                }
            }
            UserCommand::ToggleManualImpairment => {
                self.manual_impairment = !self.manual_impairment;
                info!(impaired = self.manual_impairment, "manual impairment override toggled");
            }
        }
    }

    fn publish_owned(&mut self) {
        let owned = std::iter::once(self.store.own()).chain(self.store.owned_emergency());
        let payloads: Vec<_> = owned.map(|vehicle| self.codec.encode(vehicle)).collect();

        for payload in payloads {
            let result = match payload {
                Ok(bytes) => self.network.publish(bytes),
                Err(e) => {
                    warn!(error = %e, "could not encode own state");
                    continue;
                }
            };
            match result {
                Ok(()) => {
                    self.stats.published += 1;
                    if !self.publish_healthy {
                        info!("publishing recovered");
                        self.publish_healthy = true;
                    }
                }
                Err(e) => {
                    self.stats.publish_failures += 1;
                    if self.publish_healthy {
                        warn!(error = %e, "publish failed, continuing on local state");
                        self.publish_healthy = false;
                    } else {
                        debug!(error = %e, "publish failed");
                    }
                }
            }
        }
    }

    fn merge_inbound(&mut self, now: Duration) -> usize {
        let packets = self.network.drain_inbound();
        for packet in &packets {
            match self.codec.decode(&packet.payload) {
                Ok(update) => match self.store.apply_update(&update, now) {
                    ApplyOutcome::IgnoredOwn => self.stats.ignored_own += 1,
                    ApplyOutcome::IgnoredOwnedEmergency => self.stats.ignored_emergency += 1,
                    ApplyOutcome::Materialized => {
                        self.stats.materialized += 1;
                        self.stats.applied += 1;
                    }
                    ApplyOutcome::Refreshed => self.stats.applied += 1,
                },
                Err(e) => {
                    self.stats.decode_failures += 1;
                    debug!(error = %e, bytes = packet.size(), "dropped inbound message");
                }
            }
        }
        self.stats.dropped_inbound = self.network.dropped_inbound();
        packets.len()
    }

    /// Ticks at the configured rate until `stop` is set.
    pub async fn run(&mut self, stop: &AtomicBool) {
        self.run_with(stop, |_, _| {}).await;
    }

    /// Like [`run`](Self::run), handing every tick's report to `on_tick`.
    pub async fn run_with<F>(&mut self, stop: &AtomicBool, mut on_tick: F)
    where
        F: FnMut(&Self, &TickReport),
    {
        let frame = self.config.frame();
        while !stop.load(Ordering::Relaxed) {
            let started = self.context.now();
            let report = self.tick();
            on_tick(self, &report);
            let spent = self.context.now().saturating_sub(started);
            self.context.sleep(frame.saturating_sub(spent)).await;
        }
        info!(vehicle = %self.store.own_id(), ticks = self.stats.ticks, "agent stopped");
    }

    pub fn store(&self) -> &ReplicationStore {
        &self.store
    }

    /// Direct access for scenario setup.
    pub fn store_mut(&mut self) -> &mut ReplicationStore {
        &mut self.store
    }

    pub fn own(&self) -> &VehicleState {
        self.store.own()
    }

    pub fn views(&self) -> Vec<VehicleView> {
        VehicleView::all(&self.store)
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::from_store(&self.store, self.is_impaired())
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn tick_count(&self) -> u64 {
        self.stats.ticks
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn node_id(&self) -> NodeId {
        self.network.local_id()
    }

    /// Current time from the agent's context, in seconds.
    pub fn now_secs(&self) -> f64 {
        self.context.now().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::VehicleUpdate;
    use crate::kinematics::Motion;
    use crate::vehicle::{Color, EMERGENCY_VEHICLE_ID};
    use doubles::*;

    /// Test doubles that avoid depending on the simulator crate.
    mod doubles {
        use async_trait::async_trait;
        use std::future::Future;
        use std::sync::Mutex;
        use std::time::{Duration, SystemTime, UNIX_EPOCH};
        use v2x_env::{EnvError, InboundPacket, Mailbox, MailboxSender, NetworkTransport, NodeId, V2xContext};

        pub struct ManualClock(Mutex<Duration>);

        impl ManualClock {
            pub fn new() -> Self {
                Self(Mutex::new(Duration::ZERO))
            }

            pub fn advance(&self, secs: f64) {
                *self.0.lock().unwrap() += Duration::from_secs_f64(secs);
            }
        }

        #[async_trait]
        impl V2xContext for ManualClock {
            fn now(&self) -> Duration {
                *self.0.lock().unwrap()
            }

            fn system_time(&self) -> SystemTime {
                UNIX_EPOCH + self.now()
            }

            async fn sleep(&self, duration: Duration) {
                self.advance(duration.as_secs_f64());
                tokio::task::yield_now().await;
            }

            fn spawn<F>(&self, _name: &str, _future: F)
            where
                F: Future<Output = ()> + Send + 'static,
            {
            }

            fn seed(&self) -> u64 {
                0
            }
        }

        pub struct LoopbackTransport {
            pub published: Mutex<Vec<Vec<u8>>>,
            pub fail: Mutex<bool>,
            inbound: Mailbox<InboundPacket>,
        }

        impl LoopbackTransport {
            pub fn new() -> Self {
                Self {
                    published: Mutex::new(Vec::new()),
                    fail: Mutex::new(false),
                    inbound: Mailbox::new(64),
                }
            }

            pub fn deliver(&self, payload: &[u8]) {
                self.sender().push(InboundPacket::new(payload.to_vec())).unwrap();
            }

            pub fn sender(&self) -> MailboxSender<InboundPacket> {
                self.inbound.sender()
            }

            pub fn take_published(&self) -> Vec<Vec<u8>> {
                std::mem::take(&mut *self.published.lock().unwrap())
            }
        }

        impl NetworkTransport for LoopbackTransport {
            fn publish(&self, payload: Vec<u8>) -> Result<(), EnvError> {
                if *self.fail.lock().unwrap() {
                    return Err(EnvError::network("broker gone"));
                }
                self.published.lock().unwrap().push(payload);
                Ok(())
            }

            fn drain_inbound(&self) -> Vec<InboundPacket> {
                self.inbound.drain()
            }

            fn local_id(&self) -> NodeId {
                NodeId::from_seed(0)
            }
        }
    }

    type TestAgent = VehicleAgent<ManualClock, LoopbackTransport>;

    fn agent_at(lane: u8, position: f64, speed: f64) -> (TestAgent, Arc<ManualClock>, Arc<LoopbackTransport>) {
        let clock = Arc::new(ManualClock::new());
        let net = Arc::new(LoopbackTransport::new());
        let config = AgentConfig::default().with_vehicle_id("ME");
        let own = VehicleState::new(
            VehicleId::new("ME"),
            false,
            lane,
            Motion::new(position, speed),
            Color::OWN,
            &config.road,
        );
        let agent = VehicleAgent::new(clock.clone(), net.clone(), config, own);
        (agent, clock, net)
    }

    fn peer_payload(id: &str, lane: u8, position: f64, speed: f64) -> Vec<u8> {
        let config = AgentConfig::default();
        let peer = VehicleState::new(
            VehicleId::new(id),
            id == EMERGENCY_VEHICLE_ID,
            lane,
            Motion::new(position, speed),
            Color([9, 9, 9]),
            &config.road,
        );
        StateCodec::new(&config.road).encode(&peer).unwrap()
    }

    fn decode(bytes: &[u8]) -> VehicleUpdate {
        StateCodec::new(&AgentConfig::default().road).decode(bytes).unwrap()
    }

    #[test]
    fn test_tick_publishes_own_state() {
        let (mut agent, clock, net) = agent_at(1, 100.0, 25.0);
        clock.advance(0.1);
        agent.tick();

        let published = net.take_published();
        assert_eq!(published.len(), 1);
        let update = decode(&published[0]);
        assert_eq!(update.id.as_str(), "ME");
        assert_eq!(update.position, agent.own().position);
        assert_eq!(agent.stats().published, 1);
    }

    #[test]
    fn test_first_tick_uses_one_frame_and_dt_is_capped() {
        let (mut agent, clock, _net) = agent_at(1, 100.0, 25.0);
        let first = agent.tick();
        assert!((first.dt - 1.0 / 60.0).abs() < 1e-9);

        clock.advance(5.0);
        let second = agent.tick();
        assert_eq!(second.dt, MAX_TICK_DT);
    }

    #[test]
    fn test_inbound_materializes_and_echo_ignored() {
        let (mut agent, clock, net) = agent_at(1, 100.0, 25.0);
        net.deliver(&peer_payload("PEER", 2, 500.0, 20.0));
        net.deliver(&peer_payload("ME", 3, 0.0, 0.0));
        net.deliver(b"{not json");

        clock.advance(0.1);
        let report = agent.tick();

        assert_eq!(report.inbound, 3);
        assert!(agent.store().contains("PEER"));
        assert_eq!(agent.own().lane, 1);
        let stats = agent.stats();
        assert_eq!(stats.materialized, 1);
        assert_eq!(stats.ignored_own, 1);
        assert_eq!(stats.decode_failures, 1);
    }

    #[test]
    fn test_critical_leader_brakes_own_car() {
        let (mut agent, clock, net) = agent_at(1, 0.0, 30.0);
        net.deliver(&peer_payload("B", 1, 50.0, 0.0));
        clock.advance(0.1);
        agent.tick(); // merge happens at the end of this tick

        clock.advance(0.1);
        let report = agent.tick();
        assert_eq!(report.rule, RuleKind::CriticalFollowing);
        assert!(agent.own().braking);
        assert!(agent.own().warning);
        assert!(agent.own().speed < 30.0);
    }

    #[test]
    fn test_lane_and_cruise_commands() {
        let (mut agent, clock, _net) = agent_at(0, 0.0, 25.0);
        let commands = agent.command_sender();
        commands.push(UserCommand::ChangeLane(-1)).unwrap();
        commands.push(UserCommand::AdjustCruise(500.0)).unwrap();
        clock.advance(0.1);
        agent.tick();
        assert_eq!(agent.own().lane, 0);
        assert_eq!(agent.own().user_target_speed, agent.config().road.max_speed);

        commands.push(UserCommand::ChangeLane(1)).unwrap();
        commands.push(UserCommand::AdjustCruise(-1000.0)).unwrap();
        clock.advance(0.1);
        agent.tick();
        assert_eq!(agent.own().lane, 1);
        assert_eq!(agent.own().user_target_speed, 0.0);
    }

    #[test]
    fn test_summon_emergency_publishes_both_and_guards_id() {
        let (mut agent, clock, net) = agent_at(2, 1000.0, 25.0);
        agent.command_sender().push(UserCommand::SummonEmergency).unwrap();
        clock.advance(0.1);
        agent.tick();

        assert!(agent.store().owns_emergency());
        let published = net.take_published();
        assert_eq!(published.len(), 2);
        assert_eq!(decode(&published[1]).id.as_str(), EMERGENCY_VEHICLE_ID);

        // A peer claiming the same id is ignored, and our ambulance keeps moving
        net.deliver(&peer_payload(EMERGENCY_VEHICLE_ID, 3, 1500.0, 0.0));
        agent.command_sender().push(UserCommand::SummonEmergency).unwrap();
        clock.advance(0.1);
        agent.tick();

        let amb = agent.store().owned_emergency().unwrap();
        assert_eq!(amb.lane, 0);
        assert!(amb.position > 0.0);
        assert_eq!(agent.stats().ignored_emergency, 1);
    }

    #[test]
    fn test_owned_emergency_never_swept() {
        let (mut agent, clock, _net) = agent_at(2, 1000.0, 25.0);
        agent.command_sender().push(UserCommand::SummonEmergency).unwrap();
        for _ in 0..100 {
            clock.advance(0.1);
            agent.tick();
        }
        assert!(agent.store().owned_emergency().is_some());
        assert_eq!(agent.stats().ghosts_evicted, 0);
    }

    #[test]
    fn test_manual_impairment_pulls_over_and_stops() {
        let (mut agent, clock, _net) = agent_at(1, 0.0, 25.0);
        agent.command_sender().push(UserCommand::ToggleManualImpairment).unwrap();

        clock.advance(0.1);
        let first = agent.tick();
        assert_eq!(first.rule, RuleKind::ImpairedDriver);
        assert_eq!(agent.own().lane, 2);
        assert!(agent.own().drowsy_alert);

        for _ in 0..100 {
            clock.advance(0.1);
            agent.tick();
        }
        assert_eq!(agent.own().lane, 3);
        assert_eq!(agent.own().speed, 0.0);
        assert!(agent.own().braking);
        assert_eq!(agent.own().visual_lane, 3.0);
        assert!(agent.dashboard().any_drowsy);
    }

    #[test]
    fn test_external_attention_signal_drives_decision() {
        let (mut agent, clock, _net) = agent_at(1, 0.0, 25.0);
        agent.attention_signal().set(true);
        clock.advance(0.1);
        assert_eq!(agent.tick().rule, RuleKind::ImpairedDriver);

        agent.attention_signal().set(false);
        clock.advance(0.1);
        assert_eq!(agent.tick().rule, RuleKind::FreeCruise);
        assert!(!agent.own().drowsy_alert);
    }

    #[test]
    fn test_silent_peer_becomes_ghost() {
        let (mut agent, clock, net) = agent_at(1, 0.0, 25.0);
        net.deliver(&peer_payload("PEER", 2, 500.0, 20.0));
        clock.advance(0.1);
        agent.tick();
        assert!(agent.store().contains("PEER"));

        let mut evicted = Vec::new();
        for _ in 0..40 {
            clock.advance(0.1);
            evicted.extend(agent.tick().evicted);
        }
        assert_eq!(evicted, vec![VehicleId::new("PEER")]);
        assert_eq!(agent.store().len(), 1);
    }

    #[test]
    fn test_publish_failure_is_not_fatal() {
        let (mut agent, clock, net) = agent_at(1, 0.0, 25.0);
        *net.fail.lock().unwrap() = true;
        for _ in 0..3 {
            clock.advance(0.1);
            agent.tick();
        }
        assert_eq!(agent.stats().publish_failures, 3);
        assert_eq!(agent.tick_count(), 3);
        assert!(agent.own().position > 0.0);

        *net.fail.lock().unwrap() = false;
        clock.advance(0.1);
        agent.tick();
        assert_eq!(agent.stats().published, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_flag() {
        let (mut agent, _clock, _net) = agent_at(1, 0.0, 25.0);
        let stop = AtomicBool::new(false);
        let sender = agent.command_sender();

        // ManualClock::sleep advances time and yields instead of waiting
        let run = async {
            agent.run(&stop).await;
        };
        let stopper = async {
            tokio::task::yield_now().await;
            sender.push(UserCommand::AdjustCruise(1.0)).unwrap();
            stop.store(true, Ordering::Relaxed);
        };
        tokio::join!(run, stopper);

        assert!(agent.tick_count() >= 1);
    }

    #[tokio::test]
    async fn test_run_with_reports_every_tick() {
        let (mut agent, _clock, _net) = agent_at(1, 0.0, 25.0);
        let stop = AtomicBool::new(false);
        let mut reports = 0u64;

        agent
            .run_with(&stop, |agent, report| {
                reports += 1;
                assert_eq!(report.rule, RuleKind::FreeCruise);
                if agent.tick_count() == 5 {
                    stop.store(true, Ordering::Relaxed);
                }
            })
            .await;

        assert_eq!(reports, 5);
        assert_eq!(agent.tick_count(), 5);
    }
}
