//! Vehicle identity and replicated state.

use crate::codec::VehicleUpdate;
use crate::config::RoadConfig;
use crate::kinematics::Motion;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::time::Duration;

/// The one shared identity an agent can summon and then own.
pub const EMERGENCY_VEHICLE_ID: &str = "AMB-1";

/// Globally unique vehicle identity; the ownership key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn emergency() -> Self {
        Self(EMERGENCY_VEHICLE_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_emergency_slot(&self) -> bool {
        self.0 == EMERGENCY_VEHICLE_ID
    }
}

impl Borrow<str> for VehicleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VehicleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGB render tag, `[r, g, b]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const OWN: Color = Color([0, 200, 255]);
    pub const EMERGENCY: Color = Color([255, 215, 0]);

    /// A random bluish tone for background traffic.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Color([rng.gen_range(50..=200), rng.gen_range(50..=200), 255])
    }
}

/// One vehicle as known by the local agent.
///
/// For an owned vehicle this is the authoritative state; for any other id
/// it is a replica rebuilt from the latest inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub id: VehicleId,
    pub is_emergency: bool,

    /// Authoritative lane index, `0..lane_count`
    pub lane: u8,

    /// Animated lane position; local only
    pub visual_lane: f64,

    pub position: f64,
    pub speed: f64,

    /// Cruise speed chosen by the driver; local only
    pub user_target_speed: f64,

    /// Last decision output; local only
    pub target_speed: f64,

    pub color: Color,
    pub drowsy_alert: bool,
    pub braking: bool,

    /// Vehicle-ahead warning; local only
    pub warning: bool,

    /// Local clock reading of the last write (own tick or inbound merge)
    pub last_seen_at: Duration,

    /// Seconds until another automatic lane change is allowed
    pub lane_change_cooldown: f64,
}

impl VehicleState {
    pub fn new(
        id: VehicleId,
        is_emergency: bool,
        lane: u8,
        motion: Motion,
        color: Color,
        config: &RoadConfig,
    ) -> Self {
        Self {
            id,
            is_emergency,
            lane,
            visual_lane: f64::from(lane),
            position: motion.position,
            speed: motion.speed,
            user_target_speed: config.default_cruise_speed,
            target_speed: motion.speed,
            color,
            drowsy_alert: false,
            braking: false,
            warning: false,
            last_seen_at: Duration::ZERO,
            lane_change_cooldown: 0.0,
        }
    }

    /// The agent's own car: lane 1, somewhere on the first 1500 m, 20-30 m/s.
    pub fn spawn_own<R: Rng + ?Sized>(id: VehicleId, rng: &mut R, config: &RoadConfig) -> Self {
        let lane = 1u8.min(config.outer_lane());
        let position = rng.gen_range(0.0..config.track_length.min(1500.0));
        let speed = f64::from(rng.gen_range(20u8..=30));
        Self::new(id, false, lane, Motion::new(position, speed), Color::OWN, config)
    }

    /// The shared emergency vehicle, entering at the start of lane 0 at full speed.
    pub fn spawn_emergency(config: &RoadConfig) -> Self {
        Self::new(
            VehicleId::emergency(),
            true,
            0,
            Motion::new(0.0, config.max_speed),
            Color::EMERGENCY,
            config,
        )
    }

    /// Materializes a replica from its first inbound message.
    pub fn from_update(update: &VehicleUpdate, now: Duration, config: &RoadConfig) -> Self {
        let mut state = Self::new(
            update.id.clone(),
            update.is_emergency,
            update.lane,
            Motion::new(update.position, update.speed),
            update.color,
            config,
        );
        state.drowsy_alert = update.drowsy_alert;
        state.braking = update.braking;
        state.last_seen_at = now;
        state
    }

    /// Overwrites the replicated fields of a known replica; color stays as first seen.
    pub fn merge_update(&mut self, update: &VehicleUpdate, now: Duration) {
        self.lane = update.lane;
        self.position = update.position;
        self.speed = update.speed;
        self.is_emergency = update.is_emergency;
        self.drowsy_alert = update.drowsy_alert;
        self.braking = update.braking;
        self.last_seen_at = now;
    }

    pub fn motion(&self) -> Motion {
        Motion::new(self.position, self.speed)
    }

    pub fn set_motion(&mut self, motion: Motion) {
        self.position = motion.position;
        self.speed = motion.speed;
    }

    /// Counts the lane-change cooldown down by `dt`, never below zero.
    pub fn tick_cooldown(&mut self, dt: f64) {
        self.lane_change_cooldown = (self.lane_change_cooldown - dt).max(0.0);
    }

    pub fn cooldown_elapsed(&self) -> bool {
        self.lane_change_cooldown <= 0.0
    }

    /// Speed in km/h for dashboards.
    pub fn speed_kmh(&self) -> f64 {
        self.speed * 3.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spawn_own_defaults() {
        let config = RoadConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let car = VehicleState::spawn_own(VehicleId::new("CAR1"), &mut rng, &config);

        assert_eq!(car.lane, 1);
        assert_eq!(car.visual_lane, 1.0);
        assert!(!car.is_emergency);
        assert!((0.0..1500.0).contains(&car.position));
        assert!((20.0..=30.0).contains(&car.speed));
        assert_eq!(car.user_target_speed, 25.0);
        assert_eq!(car.color, Color::OWN);
    }

    #[test]
    fn test_spawn_emergency_defaults() {
        let config = RoadConfig::default();
        let amb = VehicleState::spawn_emergency(&config);

        assert_eq!(amb.id.as_str(), EMERGENCY_VEHICLE_ID);
        assert!(amb.id.is_emergency_slot());
        assert!(amb.is_emergency);
        assert_eq!(amb.lane, 0);
        assert_eq!(amb.position, 0.0);
        assert_eq!(amb.speed, config.max_speed);
        assert_eq!(amb.color, Color::EMERGENCY);
    }

    #[test]
    fn test_cooldown_floors_at_zero() {
        let config = RoadConfig::default();
        let mut amb = VehicleState::spawn_emergency(&config);
        amb.lane_change_cooldown = 0.5;
        amb.tick_cooldown(0.3);
        assert!(!amb.cooldown_elapsed());
        amb.tick_cooldown(0.3);
        assert_eq!(amb.lane_change_cooldown, 0.0);
        assert!(amb.cooldown_elapsed());
    }

    #[test]
    fn test_merge_keeps_first_color() {
        let config = RoadConfig::default();
        let first = VehicleUpdate {
            id: VehicleId::new("CAR2"),
            lane: 2,
            position: 10.0,
            speed: 20.0,
            is_emergency: false,
            color: Color([1, 2, 3]),
            drowsy_alert: false,
            braking: false,
        };
        let mut replica = VehicleState::from_update(&first, Duration::from_secs(1), &config);
        assert_eq!(replica.visual_lane, 2.0);

        let second = VehicleUpdate {
            lane: 3,
            position: 30.0,
            color: Color([9, 9, 9]),
            braking: true,
            ..first
        };
        replica.merge_update(&second, Duration::from_secs(2));

        assert_eq!(replica.lane, 3);
        assert_eq!(replica.position, 30.0);
        assert!(replica.braking);
        assert_eq!(replica.color, Color([1, 2, 3]));
        assert_eq!(replica.last_seen_at, Duration::from_secs(2));
        // The animation catches up on its own
        assert_eq!(replica.visual_lane, 2.0);
    }

    #[test]
    fn test_vehicle_id_borrow_lookup() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(VehicleId::new("CAR9"), 1);
        assert_eq!(map.get("CAR9"), Some(&1));
    }
}
