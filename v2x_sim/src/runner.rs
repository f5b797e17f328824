//! Scenario runner - executes chaos engineering test scenarios.
//!
//! Every scenario drives real `VehicleAgent`s through a `SimWorld`; pass or
//! fail is judged from the agents' own state and the consistency oracle.

use crate::exporter::{AgentFrame, SimEvent, SimExport, SimFrame};
use crate::oracle::{ConsistencyOracle, ConsistencyReport};
use crate::scenarios::ScenarioId;
use crate::world::{SimAgent, SimConfig, SimWorld, SpawnSpec};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use v2x_core::{
    backward_distance, forward_distance, AttentionDebouncer, EncodeError, RoadConfig, StateCodec, UserCommand,
    VehicleState, EMERGENCY_VEHICLE_ID,
};
use v2x_env::{EnvError, NetworkController, NodeId, V2xContext};

/// Replica drift allowed on a clean network (one tick of travel plus margin).
const CLEAN_TOLERANCE_M: f64 = 5.0;

/// Why a scenario failed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("agent {0} vanished")]
    AgentMissing(NodeId),

    #[error("command rejected: {0}")]
    Command(#[from] EnvError),

    #[error("could not encode injected state: {0}")]
    Encode(#[from] EncodeError),

    /// Replicas disagree with their owners after a phase that should converge
    #[error("{phase}: {report:?}")]
    Inconsistent {
        phase: &'static str,
        report: ConsistencyReport,
    },

    #[error("{0}")]
    Assertion(String),
}

impl ScenarioError {
    fn assertion(reason: impl Into<String>) -> Self {
        Self::Assertion(reason.into())
    }
}

type ScenarioOutcome = Result<(), ScenarioError>;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    pub total_ticks: u64,
    pub final_time_secs: f64,

    /// Distinct vehicles on the road at the end
    pub final_vehicle_count: usize,

    pub failure_reason: Option<String>,
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
    pub max_latency_ms: u64,

    /// Final replica drift from the oracle (metres)
    pub max_position_error: f64,

    pub ghost_evictions: u64,
    pub decode_failures: u64,
    pub emergency_owners: usize,
}

/// A world plus optional frame recording.
struct Session {
    world: SimWorld,
    export: Option<SimExport>,
    export_interval: u64,
    pending_events: Vec<SimEvent>,
}

impl Session {
    fn step(&mut self) {
        self.world.tick();
        let tick = self.world.tick_count();

        if tick % 30 == 0 {
            debug!("  t={:.1}s | agents={} | bus={:?}", self.world.time(), self.world.agent_count(), self.world.metrics());
        }

        let Some(export) = self.export.as_mut() else {
            return;
        };
        if tick % self.export_interval.max(1) != 0 && self.pending_events.is_empty() {
            return;
        }
        let agents = self
            .world
            .agents()
            .map(|agent| AgentFrame {
                vehicle_id: agent.own().id.to_string(),
                node: agent.node_id().to_string(),
                vehicles: agent.views(),
            })
            .collect();
        export.add_frame(SimFrame {
            time_sec: self.world.time(),
            agents,
            events: std::mem::take(&mut self.pending_events),
        });
    }

    /// Ticks until `until_secs` of virtual time, calling `each_tick` after every tick.
    fn run_until(&mut self, until_secs: f64, mut each_tick: impl FnMut(&SimWorld)) {
        let target = (until_secs * self.world.config.tick_rate_hz as f64).round() as u64;
        while self.world.tick_count() < target {
            self.step();
            each_tick(&self.world);
        }
    }

    fn event(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("  {} at t={:.1}s", message, self.world.time());
        if self.export.is_some() {
            self.pending_events.push(SimEvent::info(message));
        }
    }

    fn agent(&self, id: NodeId) -> Result<&SimAgent, ScenarioError> {
        self.world.agent(id).ok_or(ScenarioError::AgentMissing(id))
    }

    fn command(&self, id: NodeId, command: UserCommand) -> ScenarioOutcome {
        Ok(self.agent(id)?.command_sender().push(command)?)
    }

    fn road(&self) -> &RoadConfig {
        &self.world.config.road
    }

    fn consistency(&self) -> ConsistencyReport {
        ConsistencyOracle::new(self.road().track_length).check(&self.world.stores())
    }

    /// Sets loss or latency on every link between distinct agents.
    fn for_each_link(&self, mut apply: impl FnMut(&dyn NetworkController, NodeId, NodeId)) {
        let ids = self.world.node_ids();
        for &from in &ids {
            for &to in ids.iter().filter(|&&to| to != from) {
                apply(&self.world.network_controller, from, to);
            }
        }
    }

    fn total_evictions(&self) -> u64 {
        self.world.agents().map(|agent| agent.stats().ghosts_evicted).sum()
    }
}

/// Runs chaos scenarios.
pub struct ScenarioRunner {
    seed: u64,
    num_agents: usize,
    tick_rate_hz: u32,
    max_duration_secs: f64,

    /// Record a frame every N ticks when exporting
    export_interval: u64,
}

impl ScenarioRunner {
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self {
            seed,
            num_agents,
            tick_rate_hz: 30,
            max_duration_secs: 10.0,
            export_interval: 10,
        }
    }

    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the run length; scenarios never run shorter than their own phases need.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_export_interval(mut self, ticks: u64) -> Self {
        self.export_interval = ticks.max(1);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None).0
    }

    /// Runs a scenario while recording frames for visualisation.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let (result, export) = self.execute(scenario, Some(SimExport::new(scenario.name(), self.seed)));
        let mut export = export.unwrap_or_else(|| SimExport::new(scenario.name(), self.seed));
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: Option<SimExport>) -> (ScenarioResult, Option<SimExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let duration = self.max_duration_secs.max(scenario.min_duration_secs());
        let mut session = Session {
            world: SimWorld::new(SimConfig {
                seed: self.seed,
                num_agents: self.num_agents,
                tick_rate_hz: self.tick_rate_hz,
                max_duration_secs: duration,
                road: RoadConfig::default(),
            }),
            export,
            export_interval: self.export_interval,
            pending_events: Vec::new(),
        };

        let outcome = match scenario {
            ScenarioId::CarFollowing => self.run_car_following(&mut session, duration),
            ScenarioId::AmbulanceYield => self.run_ambulance_yield(&mut session, duration),
            ScenarioId::DrowsyPullOver => self.run_drowsy_pull_over(&mut session, duration),
            ScenarioId::GhostEviction => self.run_ghost_eviction(&mut session, duration),
            ScenarioId::SplitBrain => self.run_split_brain(&mut session, duration),
            ScenarioId::PacketLoss => self.run_packet_loss(&mut session, duration),
            ScenarioId::Jitter => self.run_jitter(&mut session, duration),
            ScenarioId::AmbulanceContention => self.run_ambulance_contention(&mut session, duration),
        };

        let report = session.consistency();
        let world = &session.world;
        let bus = world.metrics();
        let metrics = ScenarioMetrics {
            packets_sent: bus.published,
            packets_delivered: bus.delivered,
            packets_dropped: bus.dropped(),
            max_latency_ms: bus.max_latency_ms,
            max_position_error: report.max_position_error,
            ghost_evictions: session.total_evictions(),
            decode_failures: world.agents().map(|agent| agent.stats().decode_failures).sum(),
            emergency_owners: report.emergency_owners,
        };

        match &outcome {
            Ok(()) => info!("✓ {} complete: {} ticks, {} packets", scenario.name(), world.tick_count(), bus.published),
            Err(reason) => info!("✗ {} failed: {}", scenario.name(), reason),
        }

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            total_ticks: world.tick_count(),
            final_time_secs: world.time(),
            final_vehicle_count: world.agent_count() + usize::from(report.emergency_owners > 0),
            failure_reason: outcome.err().map(|e| e.to_string()),
            metrics,
        };
        (result, session.export)
    }

    /// V2X-001: CarFollowing - leader stops, follower must stop behind it.
    fn run_car_following(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-001: CarFollowing - stopping leader");

        let leader = session.world.spawn_agent(SpawnSpec::new("LEAD", 1, 150.0, 10.0).with_cruise(10.0));
        let follower = session.world.spawn_agent(SpawnSpec::new("FOLLOW", 1, 0.0, 25.0));
        let track_length = session.road().track_length;
        let critical = session.road().critical_dist;

        let mut min_gap = f64::INFINITY;
        let mut track_gap = |world: &SimWorld| {
            if let (Some(lead), Some(follow)) = (world.agent(leader), world.agent(follower)) {
                let gap = forward_distance(follow.own().position, lead.own().position, track_length);
                min_gap = min_gap.min(gap);
            }
        };

        session.run_until(5.0, &mut track_gap);
        session.event("leader brakes to a stop");
        session.command(leader, UserCommand::AdjustCruise(-1000.0))?;
        session.run_until(duration, &mut track_gap);

        let follow = session.agent(follower)?.own();
        if min_gap <= critical {
            return Err(ScenarioError::assertion(format!("gap shrank to {:.1}m (critical {:.0}m)", min_gap, critical)));
        }
        if follow.speed > 0.5 {
            return Err(ScenarioError::assertion(format!("follower still moving at {:.1} m/s", follow.speed)));
        }
        info!("  min gap {:.1}m", min_gap);
        Ok(())
    }

    /// V2X-002: AmbulanceYield - slow car in lane 0 must clear the way.
    fn run_ambulance_yield(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-002: AmbulanceYield - clear the emergency lane");

        let caller = session.world.spawn_agent(SpawnSpec::new("CALLER", 2, 1000.0, 25.0));
        let slow = session.world.spawn_agent(SpawnSpec::new("SLOW", 0, 600.0, 10.0).with_cruise(10.0));
        session.command(caller, UserCommand::SummonEmergency)?;
        session.event("ambulance summoned");

        let track_length = session.road().track_length;
        let critical = session.road().critical_dist;
        let mut yielded_at = None;
        let mut conflicts = 0u32;

        session.run_until(duration, |world| {
            let (Some(caller), Some(slow)) = (world.agent(caller), world.agent(slow)) else {
                return;
            };
            let Some(ambulance) = caller.store().owned_emergency() else {
                return;
            };
            let car = slow.own();
            if car.lane != 0 && yielded_at.is_none() {
                yielded_at = Some(world.time());
            }
            if car.lane == ambulance.lane
                && backward_distance(car.position, ambulance.position, track_length) < critical
            {
                conflicts += 1;
            }
        });

        if !session.agent(caller)?.store().owns_emergency() {
            return Err(ScenarioError::assertion("caller never dispatched the ambulance"));
        }
        let Some(yielded_at) = yielded_at else {
            return Err(ScenarioError::assertion("car never left the ambulance's lane"));
        };
        if conflicts > 0 {
            return Err(ScenarioError::assertion(format!("ambulance was blocked for {} ticks", conflicts)));
        }
        info!("  yielded at t={:.2}s", yielded_at);
        Ok(())
    }

    /// V2X-003: DrowsyPullOver - detector loses the face, car parks itself.
    fn run_drowsy_pull_over(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-003: DrowsyPullOver - impaired driver");

        let drowsy = session.world.spawn_agent(SpawnSpec::new("DROWSY", 0, 0.0, 25.0));
        let witness = session.world.spawn_agent(SpawnSpec::new("WITNESS", 1, 1000.0, 25.0));

        let mut debouncer = AttentionDebouncer::new(
            session.agent(drowsy)?.attention_signal(),
            session.road().drowsy_time_threshold(),
        );
        session.event("driver looks away at t=1s");
        session.run_until(duration, |world| {
            debouncer.observe(world.time() < 1.0, world.context.now());
        });

        let road = session.road().clone();
        let car = session.agent(drowsy)?.own();
        if car.lane != road.service_lane {
            return Err(ScenarioError::assertion(format!(
                "car ended in lane {} instead of {}",
                car.lane, road.service_lane
            )));
        }
        if car.speed > 0.01 || !car.braking || !car.drowsy_alert {
            return Err(ScenarioError::assertion(format!("car not stopped with alert (speed {:.2})", car.speed)));
        }

        let seen = session.agent(witness)?;
        if !seen.dashboard().any_drowsy {
            return Err(ScenarioError::assertion("witness never saw the drowsy alert"));
        }
        Ok(())
    }

    /// V2X-004: GhostEviction - a vanished agent is forgotten everywhere.
    fn run_ghost_eviction(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-004: GhostEviction - disconnect one agent");

        session.world.config.num_agents = self.num_agents.max(3);
        let ids = session.world.spawn_agents();
        session.run_until(2.0, |_| {});

        let before = session.consistency();
        if before.missing_replicas > 0 {
            return Err(ScenarioError::assertion(format!(
                "{} replicas missing before disconnect",
                before.missing_replicas
            )));
        }

        let victim = ids[ids.len() - 1];
        let removed = session
            .world
            .remove_agent(victim)
            .ok_or(ScenarioError::AgentMissing(victim))?;
        let victim_id = removed.own().id.clone();
        session.event(format!("{} disconnected", victim_id));

        let deadline = 2.0 + session.road().ghost_timeout_secs + 1.0;
        session.run_until(deadline, |_| {});

        let holders: Vec<String> = session
            .world
            .agents()
            .filter(|agent| agent.store().contains(victim_id.as_str()))
            .map(|agent| agent.own().id.to_string())
            .collect();
        if !holders.is_empty() {
            return Err(ScenarioError::assertion(format!("{} still known by {:?}", victim_id, holders)));
        }

        session.run_until(duration, |_| {});
        let after = session.consistency();
        if !after.is_consistent(CLEAN_TOLERANCE_M) {
            return Err(ScenarioError::Inconsistent {
                phase: "after eviction",
                report: after,
            });
        }
        Ok(())
    }

    /// V2X-005: SplitBrain - partition past the ghost timeout, then heal.
    fn run_split_brain(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-005: SplitBrain - Network partition test");

        session.world.config.num_agents = self.num_agents.max(4);
        let ids = session.world.spawn_agents();
        let (group_a, group_b) = ids.split_at(ids.len() / 2);

        session.run_until(2.0, |_| {});
        session.event("⚡ creating network partition");
        session.world.network_controller.partition(group_a, group_b);
        session.run_until(7.0, |_| {});

        let during = session.consistency();
        let expected_missing = 2 * group_a.len() * group_b.len();
        if during.missing_replicas != expected_missing {
            return Err(ScenarioError::assertion(format!(
                "expected {} missing replicas during partition, found {}",
                expected_missing, during.missing_replicas
            )));
        }

        session.event("✓ healing network partition");
        session.world.network_controller.heal_all();
        session.run_until(duration, |_| {});

        let after = session.consistency();
        if !after.is_consistent(CLEAN_TOLERANCE_M) {
            return Err(ScenarioError::Inconsistent {
                phase: "after healing",
                report: after,
            });
        }
        info!("  {} packets dropped during partition", session.world.metrics().dropped_partition);
        Ok(())
    }

    /// V2X-006: PacketLoss - half the traffic vanishes, nobody is evicted.
    fn run_packet_loss(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-006: PacketLoss - 50% loss on every link");

        session.world.config.num_agents = self.num_agents.max(2);
        session.world.spawn_agents();
        session.for_each_link(|controller, from, to| controller.set_link_loss(from, to, 0.5));
        session.run_until(duration, |_| {});

        let evictions = session.total_evictions();
        if evictions > 0 {
            return Err(ScenarioError::assertion(format!("{} live peers evicted", evictions)));
        }
        let report = session.consistency();
        if !report.is_consistent(60.0) {
            return Err(ScenarioError::Inconsistent {
                phase: "under packet loss",
                report,
            });
        }
        Ok(())
    }

    /// V2X-007: Jitter - late and reordered messages keep drift bounded.
    fn run_jitter(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-007: Jitter - 20ms + 0-200ms jitter");

        session.world.config.num_agents = self.num_agents.max(2);
        session.world.spawn_agents();
        session.for_each_link(|controller, from, to| controller.set_link_latency(from, to, 20));
        session.world.network_controller.set_jitter(200);

        let mut worst = 0.0f64;
        session.run_until(duration, |world| {
            if world.tick_count() % 15 == 0 {
                let report = ConsistencyOracle::new(world.config.road.track_length).check(&world.stores());
                if report.missing_replicas == 0 {
                    worst = worst.max(report.max_position_error);
                }
            }
        });

        if session.total_evictions() > 0 {
            return Err(ScenarioError::assertion("live peers evicted under jitter"));
        }
        let report = session.consistency();
        if !report.is_consistent(15.0) || worst > 15.0 {
            return Err(ScenarioError::assertion(format!("drift too large (worst {:.1}m): {:?}", worst, report)));
        }
        info!("  worst drift {:.2}m, max latency {}ms", worst, session.world.metrics().max_latency_ms);
        Ok(())
    }

    /// V2X-008: AmbulanceContention - concurrent claims and a forged update.
    fn run_ambulance_contention(&self, session: &mut Session, duration: f64) -> ScenarioOutcome {
        info!("V2X-008: AmbulanceContention - concurrent claims");

        let first = session.world.spawn_agent(SpawnSpec::new("ALPHA", 1, 500.0, 25.0));
        let second = session.world.spawn_agent(SpawnSpec::new("BRAVO", 2, 1000.0, 25.0));
        let late = session.world.spawn_agent(SpawnSpec::new("CHARLIE", 1, 1500.0, 25.0));

        // Both claims land in the same tick, before either hears the other
        session.command(first, UserCommand::SummonEmergency)?;
        session.command(second, UserCommand::SummonEmergency)?;
        session.run_until(1.0, |_| {});

        let owners = session.consistency().emergency_owners;
        if owners != 2 {
            return Err(ScenarioError::assertion(format!("expected both claims to stand, found {} owners", owners)));
        }

        session.event("forged ambulance update injected");
        let road = session.road().clone();
        let mut forged = VehicleState::spawn_emergency(&road);
        forged.lane = road.service_lane;
        forged.position = 1234.0;
        forged.speed = 0.0;
        let payload = StateCodec::new(&road).encode(&forged)?;
        session.world.inject(NodeId::from_seed(999), payload);
        session.run_until(2.0, |_| {});

        for owner in [first, second] {
            let agent = session.agent(owner)?;
            let ambulance = agent
                .store()
                .owned_emergency()
                .ok_or_else(|| ScenarioError::assertion(format!("{} lost its ambulance", agent.own().id)))?;
            if ambulance.lane != 0 || ambulance.speed < road.max_speed {
                return Err(ScenarioError::assertion(format!("{}'s ambulance was overwritten", agent.own().id)));
            }
            if agent.stats().ignored_emergency == 0 {
                return Err(ScenarioError::assertion(format!("{} never had to ignore a peer update", agent.own().id)));
            }
        }

        session.command(late, UserCommand::SummonEmergency)?;
        session.run_until(duration, |_| {});
        let late_agent = session.agent(late)?;
        if late_agent.store().owns_emergency() {
            return Err(ScenarioError::assertion("third summon claimed a second ambulance"));
        }
        if !late_agent.store().contains(EMERGENCY_VEHICLE_ID) {
            return Err(ScenarioError::assertion("bystander never saw the ambulance"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_passes_default_seed() {
        let runner = ScenarioRunner::new(42, 6);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
            assert!(result.final_time_secs >= scenario.min_duration_secs() - 1e-6);
        }
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let runner = ScenarioRunner::new(7, 4);
        let a = runner.run(ScenarioId::PacketLoss);
        let b = runner.run(ScenarioId::PacketLoss);
        assert_eq!(a.metrics.packets_dropped, b.metrics.packets_dropped);
        assert_eq!(a.metrics.packets_delivered, b.metrics.packets_delivered);
        assert!(a.metrics.packets_dropped > 0);
    }

    #[test]
    fn test_split_brain_drops_cross_traffic() {
        let result = ScenarioRunner::new(42, 4).run(ScenarioId::SplitBrain);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.packets_dropped > 0);
        assert!(result.metrics.ghost_evictions > 0);
    }

    #[test]
    fn test_export_records_frames_and_events() {
        let runner = ScenarioRunner::new(42, 2).with_export_interval(30);
        let (result, export) = runner.run_with_export(ScenarioId::CarFollowing);

        assert_eq!(export.passed, result.passed);
        assert!(export.frames.len() >= 10);
        assert!(export.frames.iter().any(|frame| !frame.events.is_empty()));
        assert_eq!(export.frames[0].agents.len(), 2);
    }

    #[test]
    fn test_contention_reports_two_owners() {
        let result = ScenarioRunner::new(42, 3).run(ScenarioId::AmbulanceContention);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.emergency_owners, 2);
        assert_eq!(result.final_vehicle_count, 4);
    }

    #[test]
    fn test_failures_are_typed() {
        let session = Session {
            world: SimWorld::new(SimConfig::default()),
            export: None,
            export_interval: 10,
            pending_events: Vec::new(),
        };
        let ghost = NodeId::from_seed(4242);

        let err = session.command(ghost, UserCommand::SummonEmergency).unwrap_err();
        assert!(matches!(err, ScenarioError::AgentMissing(id) if id == ghost));
        assert_eq!(err.to_string(), format!("agent {} vanished", ghost));

        let err = ScenarioError::Inconsistent {
            phase: "after healing",
            report: ConsistencyReport::default(),
        };
        assert!(err.to_string().starts_with("after healing: "));
    }
}
