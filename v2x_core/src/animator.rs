//! Lane Transition Animator.
//!
//! Turns the discrete lane index into a smoothly moving render position.
//! The result is display-only; nothing authoritative reads it back.

/// Below this gap the visual lane is considered settled.
const DEADBAND: f64 = 0.01;

/// After a step, gaps smaller than this snap onto the lane.
const SNAP_EPSILON: f64 = 0.05;

/// Moves `visual_lane` towards `lane` by at most `lanes_per_sec * dt`.
pub fn animate_lane(visual_lane: f64, lane: u8, lanes_per_sec: f64, dt: f64) -> f64 {
    let target = f64::from(lane);
    let gap = target - visual_lane;
    if gap.abs() <= DEADBAND {
        return target;
    }

    let step = (lanes_per_sec * dt.max(0.0)).min(gap.abs());
    let next = visual_lane + step.copysign(gap);
    if (target - next).abs() < SNAP_EPSILON {
        target
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_moves_at_fixed_rate() {
        let next = animate_lane(1.0, 2, 2.0, 0.1);
        assert_relative_eq!(next, 1.2);

        let back = animate_lane(2.0, 1, 2.0, 0.1);
        assert_relative_eq!(back, 1.8);
    }

    #[test]
    fn test_snaps_when_close() {
        assert_eq!(animate_lane(1.96, 2, 2.0, 0.001), 2.0);
        assert_eq!(animate_lane(2.005, 2, 2.0, 0.1), 2.0);
    }

    #[test]
    fn test_large_step_does_not_overshoot() {
        assert_eq!(animate_lane(0.0, 1, 2.0, 5.0), 1.0);
    }

    #[test]
    fn test_converges_over_frames() {
        let mut visual = 0.0;
        for _ in 0..120 {
            visual = animate_lane(visual, 3, 2.0, 1.0 / 60.0);
        }
        assert_eq!(visual, 3.0);
    }
}
