// src/projection.rs
//! Forward/backward projection of a tracked user to a requested timestamp,
//! with an optional correction for the turret's own yaw motion (spec §4.5).

use std::time::Instant;

use crate::polar::{PolarCoM, TrackedUser};
use crate::time_util::signed_seconds_between;

/// Kinematically project `user` to `t_target` using its instantaneous
/// per-axis rate. Pure function: does not know about the turret's own
/// motion.
pub fn project(user: &TrackedUser, t_target: Instant) -> TrackedUser {
    let dt = signed_seconds_between(user.timestamp, t_target);
    let com = PolarCoM::new(
        user.com.yaw + user.com_rate.yaw * dt,
        user.com.height + user.com_rate.height * dt,
        (user.com.ground_range + user.com_rate.ground_range * dt).max(0.0),
    );
    TrackedUser { id: user.id, timestamp: t_target, com, com_rate: user.com_rate }
}

/// Supplies the yaw the turret itself rotated through between two
/// timestamps, so a reprojected user's yaw can be expressed back in the
/// camera frame. Implemented by the controller (see `controller.rs`); the
/// tracker only depends on this trait, never on the controller directly
/// (spec §9, dependency-injection redesign note).
pub trait MotionCompensator: Send + Sync {
    /// Signed yaw (radians) the turret rotated through going from
    /// `earlier` to `later`. Always called with `earlier <= later`.
    fn yaw_rotation_between(&self, earlier: Instant, later: Instant) -> f64;
}

/// A compensator that assumes the turret never moves; used in tests and
/// wherever dynamic projection isn't wired up to a live controller.
pub struct NoOpCompensator;

impl MotionCompensator for NoOpCompensator {
    fn yaw_rotation_between(&self, _earlier: Instant, _later: Instant) -> f64 {
        0.0
    }
}

/// Project `user` to `t_target`, correcting for the turret's own yaw
/// motion over the interval between `user.timestamp` and `t_target`.
///
/// Forward in time: the turret's rotation is subtracted (the camera frame
/// rotated along with the shot, so the apparent yaw shrinks by however much
/// the camera itself turned). Backward in time: it's added back.
pub fn project_dynamic(
    user: &TrackedUser,
    t_target: Instant,
    compensator: &dyn MotionCompensator,
) -> TrackedUser {
    let mut projected = project(user, t_target);
    let forward = t_target >= user.timestamp;
    let (earlier, later) = if forward {
        (user.timestamp, t_target)
    } else {
        (t_target, user.timestamp)
    };
    let delta_yaw = compensator.yaw_rotation_between(earlier, later);
    projected.com.yaw = if forward {
        projected.com.yaw - delta_yaw
    } else {
        projected.com.yaw + delta_yaw
    };
    projected
}
