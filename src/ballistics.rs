// src/ballistics.rs
//! Ballistic aiming solve (spec §4.1) and target scoring (spec §4.2).

use num_complex::Complex64;

use crate::polar::TrackedUser;
use crate::quartic::{smallest_positive_real_root, solve_quartic};
use crate::time_util::clamp;

/// Muzzle speed / drag / gravity constants for the quartic flight-time
/// solve.
#[derive(Debug, Clone, Copy)]
pub struct BallisticsConfig {
    /// Muzzle speed, m/s.
    pub water_rate: f64,
    /// Horizontal deceleration due to drag, m/s^2.
    pub air_resistance: f64,
    /// Gravity, m/s^2. Defaults to 9.81.
    pub gravity: f64,
}

impl Default for BallisticsConfig {
    fn default() -> Self {
        Self { water_rate: 10.0, air_resistance: 0.0, gravity: 9.81 }
    }
}

/// Turret yaw/pitch, in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GunPosition {
    pub yaw: f64,
    pub pitch: f64,
}

/// The aimer's result: either a reachable gun position, or an explicit
/// "no solution" sentinel. Per spec §9's resolved open question, this
/// crate never returns NaN or a magic angle to mean "unreachable".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aim {
    Reachable(GunPosition),
    Unreachable,
}

impl Aim {
    pub fn position(&self) -> Option<GunPosition> {
        match self {
            Aim::Reachable(pos) => Some(*pos),
            Aim::Unreachable => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Aim::Reachable(_))
    }
}

const FLIGHT_TIME_IMAG_TOLERANCE: f64 = 1e-6;

/// Compute the firing angles that intercept `user`, given the user's
/// current polar COM and smoothed velocity.
pub fn calculate_aim(user: &TrackedUser, config: &BallisticsConfig) -> Aim {
    let y0 = user.com.height;
    let z0 = user.com.ground_range;
    let y_rate = user.com_rate.height;
    let z_rate = user.com_rate.ground_range;
    let v = config.water_rate;
    let a = config.air_resistance;
    let g = config.gravity;

    if y0 * y0 + z0 * z0 == 0.0 {
        return Aim::Reachable(GunPosition { yaw: user.com.yaw, pitch: 0.0 });
    }

    let coeff_a = (a * a + g * g) / 4.0;
    let coeff_b = a * z_rate + g * y_rate;
    let coeff_c = a * z0 + z_rate * z_rate + g * y0 + y_rate * y_rate - v * v;
    let coeff_d = 2.0 * z0 * z_rate + 2.0 * y0 * y_rate;
    let coeff_e = z0 * z0 + y0 * y0;

    let roots = solve_quartic(
        Complex64::new(coeff_a, 0.0),
        Complex64::new(coeff_b, 0.0),
        Complex64::new(coeff_c, 0.0),
        Complex64::new(coeff_d, 0.0),
        Complex64::new(coeff_e, 0.0),
    );

    let t = match smallest_positive_real_root(&roots, FLIGHT_TIME_IMAG_TOLERANCE) {
        Some(t) => t,
        None => return Aim::Unreachable,
    };

    let yaw = user.com.yaw + user.com_rate.yaw * t;
    let sin_theta = (y0 + y_rate * t + g * t * t / 2.0) / (v * t);
    let pitch = clamp(sin_theta, -1.0, 1.0).asin();

    Aim::Reachable(GunPosition { yaw, pitch })
}

/// Field-of-view / range constants used by the scoring policy.
#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    /// Horizontal field of view, radians.
    pub h_fov: f64,
    /// Maximum trackable depth, metres.
    pub max_depth: f64,
}

fn score(user: &TrackedUser, aim: GunPosition, config: &ScoringConfig) -> f64 {
    let centered = -2.0 * aim.yaw.abs() / (config.h_fov / 2.0) + 1.0;
    let closeness = -2.0 * (user.com.ground_range / config.max_depth) + 1.0;
    let approaching = -user.com_rate.ground_range / 7.0;
    centered + closeness + approaching
}

/// Select the highest-scoring reachable user. Unreachable users are
/// skipped entirely; ties go to whichever user was seen first in the
/// slice. Returns `None` if no user is reachable (including an empty
/// slice) — no default-constructed sentinel user is ever returned.
pub fn choose_target<'a>(
    users: &'a [TrackedUser],
    ballistics: &BallisticsConfig,
    scoring: &ScoringConfig,
) -> Option<&'a TrackedUser> {
    let mut best: Option<(&TrackedUser, f64)> = None;
    for user in users {
        let aim = match calculate_aim(user, ballistics) {
            Aim::Reachable(pos) => pos,
            Aim::Unreachable => continue,
        };
        let s = score(user, aim, scoring);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((user, s)),
        }
    }
    best.map(|(user, _)| user)
}
