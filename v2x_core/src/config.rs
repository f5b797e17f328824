//! Road and agent configuration.
//!
//! Every field has a default matching the reference deployment, so a JSON
//! config file only needs the values it wants to change.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default pub/sub topic shared by every vehicle.
pub const DEFAULT_TOPIC: &str = "v2x/hackathon/final/cars";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Physical layout of the circular road and the traffic-rule constants.
///
/// Distances are metres, speeds m/s, rates m/s², times seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadConfig {
    /// Number of lanes, including the service lane
    pub lane_count: u8,

    /// Lane reserved for impaired-driver pull-over (rightmost)
    pub service_lane: u8,

    /// Circumference of the circular track
    pub track_length: f64,

    /// Nominal speed limit
    pub max_speed: f64,

    pub accel: f64,
    pub brake: f64,

    /// Animator rate in lanes per second
    pub lane_change_speed: f64,

    pub safe_dist: f64,
    pub critical_dist: f64,
    pub ambulance_dist: f64,

    /// Replicas not refreshed for longer than this are evicted
    pub ghost_timeout_secs: f64,

    /// Continuous face absence before the driver counts as impaired
    pub drowsy_time_threshold_secs: f64,

    pub impaired_lane_cooldown_secs: f64,
    pub yield_lane_cooldown_secs: f64,

    /// Emergency vehicles cruise at `max_speed * emergency_speed_factor`
    pub emergency_speed_factor: f64,

    /// Hard cap on speed as a multiple of `max_speed`
    pub speed_cap_factor: f64,

    /// Fraction of the leader's speed adopted inside the safe distance
    pub follow_speed_factor: f64,

    /// Target speed inside the safe distance when the leader's speed is unknown
    pub fallback_follow_speed: f64,

    pub default_cruise_speed: f64,

    /// Cruise adjustment applied by one faster/slower command
    pub cruise_step: f64,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            lane_count: 4,
            service_lane: 3,
            track_length: 2000.0,
            max_speed: 250.0 / 3.6,
            accel: 10.0,
            brake: 25.0,
            lane_change_speed: 2.0,
            safe_dist: 200.0,
            critical_dist: 80.0,
            ambulance_dist: 400.0,
            ghost_timeout_secs: 3.0,
            drowsy_time_threshold_secs: 2.0,
            impaired_lane_cooldown_secs: 1.0,
            yield_lane_cooldown_secs: 2.0,
            emergency_speed_factor: 1.2,
            speed_cap_factor: 1.5,
            follow_speed_factor: 0.8,
            fallback_follow_speed: 10.0,
            default_cruise_speed: 25.0,
            cruise_step: 5.0,
        }
    }
}

impl RoadConfig {
    /// Loads a JSON config file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RoadConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lane_count == 0 {
            return Err(ConfigError::invalid("lane_count", "must be at least 1"));
        }
        if self.service_lane >= self.lane_count {
            return Err(ConfigError::invalid(
                "service_lane",
                format!("{} is outside 0..{}", self.service_lane, self.lane_count),
            ));
        }
        let positive = [
            ("track_length", self.track_length),
            ("max_speed", self.max_speed),
            ("accel", self.accel),
            ("brake", self.brake),
            ("lane_change_speed", self.lane_change_speed),
            ("ghost_timeout_secs", self.ghost_timeout_secs),
            ("speed_cap_factor", self.speed_cap_factor),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, format!("{value} must be positive")));
            }
        }
        let non_negative = [
            ("safe_dist", self.safe_dist),
            ("critical_dist", self.critical_dist),
            ("ambulance_dist", self.ambulance_dist),
            ("drowsy_time_threshold_secs", self.drowsy_time_threshold_secs),
            ("impaired_lane_cooldown_secs", self.impaired_lane_cooldown_secs),
            ("yield_lane_cooldown_secs", self.yield_lane_cooldown_secs),
            ("emergency_speed_factor", self.emergency_speed_factor),
            ("follow_speed_factor", self.follow_speed_factor),
            ("fallback_follow_speed", self.fallback_follow_speed),
            ("default_cruise_speed", self.default_cruise_speed),
            ("cruise_step", self.cruise_step),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(field, format!("{value} must be >= 0")));
            }
        }
        if self.critical_dist > self.safe_dist {
            return Err(ConfigError::invalid(
                "critical_dist",
                format!("{} exceeds safe_dist {}", self.critical_dist, self.safe_dist),
            ));
        }
        Ok(())
    }

    /// Upper bound on any vehicle's speed.
    pub fn speed_cap(&self) -> f64 {
        self.max_speed * self.speed_cap_factor
    }

    pub fn emergency_speed(&self) -> f64 {
        self.max_speed * self.emergency_speed_factor
    }

    pub fn ghost_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ghost_timeout_secs)
    }

    pub fn drowsy_time_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.drowsy_time_threshold_secs)
    }

    /// Highest lane index.
    pub fn outer_lane(&self) -> u8 {
        self.lane_count - 1
    }

    pub fn is_valid_lane(&self, lane: i64) -> bool {
        lane >= 0 && lane < i64::from(self.lane_count)
    }
}

/// Configuration for one vehicle agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Vehicle identity owned by this agent (logical name in logs)
    pub vehicle_id: String,

    /// Pub/sub topic carrying vehicle state
    pub topic: String,

    /// Tick rate in Hz (default: 60)
    pub tick_rate_hz: u32,

    /// Inbound and command mailbox capacity (default: 1024)
    pub mailbox_capacity: usize,

    pub road: RoadConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            vehicle_id: "CAR1".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            tick_rate_hz: 60,
            mailbox_capacity: 1024,
            road: RoadConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_vehicle_id(mut self, id: impl Into<String>) -> Self {
        self.vehicle_id = id.into();
        self
    }

    pub fn with_road(mut self, road: RoadConfig) -> Self {
        self.road = road;
        self
    }

    /// Duration of one frame at the configured tick rate.
    pub fn frame(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}
