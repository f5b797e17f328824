//! Decision Engine - the traffic rules for one vehicle.
//!
//! The rules form an ordered table of predicate/effect pairs. The first rule
//! whose predicate holds applies its effect and the rest are skipped, so the
//! priority order is the order of [`RULES`].
//!
//! ```text
//!   1. ImpairedDriver      drowsy driver -> service lane -> controlled stop
//!   2. YieldToEmergency    emergency vehicle close behind -> leave its lane
//!   3. EmergencyCruise     we are the emergency vehicle -> run fast
//!   4. CriticalFollowing   leader inside critical distance -> hard stop
//!   5. SafeFollowing       leader inside safe distance -> follow slower
//!   6. FreeCruise          driver's chosen cruise speed
//! ```

use crate::config::RoadConfig;
use crate::kinematics::{backward_distance, forward_distance};
use crate::vehicle::VehicleState;
use serde::Serialize;

/// Identifies a rule of the table (and which one produced a decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleKind {
    ImpairedDriver,
    YieldToEmergency,
    EmergencyCruise,
    CriticalFollowing,
    SafeFollowing,
    FreeCruise,
}

/// Nearest vehicle ahead in the same lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leader {
    /// Forward circular distance to it
    pub distance: f64,
    pub speed: f64,
}

/// What one vehicle can see of the others.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Surroundings {
    pub leader: Option<Leader>,

    /// An emergency vehicle is in our lane within `ambulance_dist` behind us
    pub emergency_behind: bool,
}

impl Surroundings {
    /// Scans every known vehicle except `subject` itself.
    pub fn scan<'a>(
        subject: &VehicleState,
        vehicles: impl IntoIterator<Item = &'a VehicleState>,
        config: &RoadConfig,
    ) -> Self {
        let mut surroundings = Surroundings::default();

        for other in vehicles {
            if other.id == subject.id || other.lane != subject.lane {
                continue;
            }

            let ahead = forward_distance(subject.position, other.position, config.track_length);
            let nearer = surroundings
                .leader
                .map_or(true, |leader| ahead < leader.distance);
            if nearer {
                surroundings.leader = Some(Leader {
                    distance: ahead,
                    speed: other.speed,
                });
            }

            let behind = backward_distance(subject.position, other.position, config.track_length);
            if other.is_emergency && behind < config.ambulance_dist {
                surroundings.emergency_behind = true;
            }
        }

        surroundings
    }

    pub fn leader_distance(&self) -> f64 {
        self.leader.map_or(f64::INFINITY, |leader| leader.distance)
    }
}

/// Output of one decision step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub target_speed: f64,
    pub lane: u8,
    pub lane_change_cooldown: f64,
    pub braking: bool,
    pub warning: bool,
    pub drowsy_alert: bool,

    /// The rule that fired
    pub rule: RuleKind,
}

impl Decision {
    /// Starting point: keep target, lane and cooldown; clear all flags.
    fn baseline(vehicle: &VehicleState) -> Self {
        Self {
            target_speed: vehicle.target_speed,
            lane: vehicle.lane,
            lane_change_cooldown: vehicle.lane_change_cooldown,
            braking: false,
            warning: false,
            drowsy_alert: false,
            rule: RuleKind::FreeCruise,
        }
    }

    pub fn apply_to(&self, vehicle: &mut VehicleState) {
        vehicle.target_speed = self.target_speed;
        vehicle.lane = self.lane;
        vehicle.lane_change_cooldown = self.lane_change_cooldown;
        vehicle.braking = self.braking;
        vehicle.warning = self.warning;
        vehicle.drowsy_alert = self.drowsy_alert;
    }
}

/// Everything a rule may look at.
pub struct RuleInput<'a> {
    pub vehicle: &'a VehicleState,
    pub surroundings: Surroundings,
    pub attention_impaired: bool,
    pub config: &'a RoadConfig,
}

/// One row of the rule table.
pub struct Rule {
    pub kind: RuleKind,
    applies: fn(&RuleInput<'_>) -> bool,
    effect: fn(&RuleInput<'_>, &mut Decision),
}

impl Rule {
    pub fn applies(&self, input: &RuleInput<'_>) -> bool {
        (self.applies)(input)
    }
}

/// The traffic rules in priority order.
pub const RULES: [Rule; 6] = [
    Rule {
        kind: RuleKind::ImpairedDriver,
        applies: |input| input.attention_impaired,
        effect: pull_over,
    },
    Rule {
        kind: RuleKind::YieldToEmergency,
        applies: |input| {
            input.surroundings.emergency_behind
                && !input.vehicle.is_emergency
                && input.vehicle.cooldown_elapsed()
        },
        effect: yield_lane,
    },
    Rule {
        kind: RuleKind::EmergencyCruise,
        applies: |input| input.vehicle.is_emergency,
        effect: |input, decision| decision.target_speed = input.config.emergency_speed(),
    },
    Rule {
        kind: RuleKind::CriticalFollowing,
        applies: |input| input.surroundings.leader_distance() < input.config.critical_dist,
        effect: |_, decision| {
            decision.target_speed = 0.0;
            decision.braking = true;
            decision.warning = true;
        },
    },
    Rule {
        kind: RuleKind::SafeFollowing,
        applies: |input| input.surroundings.leader_distance() < input.config.safe_dist,
        effect: follow_leader,
    },
    Rule {
        kind: RuleKind::FreeCruise,
        applies: |_| true,
        effect: |input, decision| decision.target_speed = input.vehicle.user_target_speed,
    },
];

fn pull_over(input: &RuleInput<'_>, decision: &mut Decision) {
    let vehicle = input.vehicle;
    decision.drowsy_alert = true;

    if vehicle.lane != input.config.service_lane {
        if vehicle.cooldown_elapsed() {
            decision.lane = step_towards(vehicle.lane, input.config.service_lane);
            decision.lane_change_cooldown = input.config.impaired_lane_cooldown_secs;
        }
    } else {
        decision.target_speed = 0.0;
        decision.braking = true;
    }
}

fn yield_lane(input: &RuleInput<'_>, decision: &mut Decision) {
    let lane = input.vehicle.lane;
    if lane < input.config.outer_lane() {
        decision.lane = lane + 1;
        decision.lane_change_cooldown = input.config.yield_lane_cooldown_secs;
    } else if lane > 0 {
        decision.lane = lane - 1;
        decision.lane_change_cooldown = input.config.yield_lane_cooldown_secs;
    }
}

// Braking is unconditional here; the warning only fires while still closing the gap.
fn follow_leader(input: &RuleInput<'_>, decision: &mut Decision) {
    let leader_speed = input.surroundings.leader.map(|leader| leader.speed);
    decision.target_speed = match leader_speed {
        Some(speed) => speed * input.config.follow_speed_factor,
        None => input.config.fallback_follow_speed,
    };
    decision.braking = true;
    if input.vehicle.speed > leader_speed.unwrap_or(0.0) {
        decision.warning = true;
    }
}

fn step_towards(lane: u8, target: u8) -> u8 {
    match lane.cmp(&target) {
        std::cmp::Ordering::Less => lane + 1,
        std::cmp::Ordering::Greater => lane - 1,
        std::cmp::Ordering::Equal => lane,
    }
}

/// Runs the rule table for `vehicle` against every known vehicle.
///
/// `vehicles` may include `vehicle` itself; it is skipped by id.
pub fn decide<'a>(
    vehicle: &VehicleState,
    vehicles: impl IntoIterator<Item = &'a VehicleState>,
    attention_impaired: bool,
    config: &RoadConfig,
) -> Decision {
    let input = RuleInput {
        vehicle,
        surroundings: Surroundings::scan(vehicle, vehicles, config),
        attention_impaired,
        config,
    };

    let mut decision = Decision::baseline(vehicle);
    if let Some(rule) = RULES.iter().find(|rule| rule.applies(&input)) {
        (rule.effect)(&input, &mut decision);
        decision.rule = rule.kind;
    }
    decision
}
