//! Kinematics Model - longitudinal motion on the circular track.
//!
//! Everything here is a pure function of its arguments so it can be called
//! without a network or a clock.

use crate::config::RoadConfig;

/// The longitudinal part of a vehicle's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Distance along the track, in `[0, track_length)`
    pub position: f64,

    /// Current speed, in `[0, speed_cap]`
    pub speed: f64,
}

impl Motion {
    pub fn new(position: f64, speed: f64) -> Self {
        Self { position, speed }
    }
}

/// Maps any finite position onto `[0, track_length)`.
pub fn wrap_position(position: f64, track_length: f64) -> f64 {
    let wrapped = position.rem_euclid(track_length);
    // rem_euclid can round up to exactly track_length for tiny negative inputs
    if wrapped >= track_length {
        0.0
    } else {
        wrapped
    }
}

/// Distance travelled forward from `from` until reaching `to`.
pub fn forward_distance(from: f64, to: f64, track_length: f64) -> f64 {
    wrap_position(to - from, track_length)
}

/// Distance from `from` back to `to`, i.e. how far `to` is behind `from`.
pub fn backward_distance(from: f64, to: f64, track_length: f64) -> f64 {
    wrap_position(from - to, track_length)
}

/// Advances one vehicle by `dt` seconds towards `target_speed`.
///
/// Speed ramps linearly (braking faster than accelerating), is capped to
/// `[0, speed_cap]`, and the position wraps to zero once it reaches the end
/// of the track.
pub fn advance(motion: Motion, target_speed: f64, dt: f64, config: &RoadConfig) -> Motion {
    let dt = dt.max(0.0);
    let mut speed = motion.speed;

    if speed < target_speed {
        speed += config.accel * dt;
    } else if speed > target_speed {
        speed -= config.brake * dt;
    }
    speed = speed.clamp(0.0, config.speed_cap());

    let mut position = motion.position + speed * dt;
    if position >= config.track_length {
        position = 0.0;
    }

    Motion { position, speed }
}
