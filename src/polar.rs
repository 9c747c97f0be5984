// src/polar.rs
//! Polar center-of-mass coordinates and the tracked-user record built from
//! them (spec §3).

use std::time::Instant;

use crate::vector::Vector3;

/// A user's center-of-mass in the camera frame after the camera offset has
/// been applied: `(yaw_angle_rad, height_m, ground_range_m)`.
///
/// `yaw_angle = atan2(x, z)`, `height = y`, `ground_range = sqrt(x^2 + z^2)`.
/// `ground_range` is always non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarCoM {
    pub yaw: f64,
    pub height: f64,
    pub ground_range: f64,
}

impl PolarCoM {
    pub fn new(yaw: f64, height: f64, ground_range: f64) -> Self {
        debug_assert!(ground_range >= 0.0, "ground_range must be non-negative");
        Self { yaw, height, ground_range }
    }

    /// Convert an offset-applied cartesian position (already in metres) to
    /// polar coordinates.
    pub fn from_cartesian(offset_position: Vector3) -> Self {
        let x = offset_position.x();
        let y = offset_position.y();
        let z = offset_position.z();
        Self {
            yaw: x.atan2(z),
            height: y,
            ground_range: (x * x + z * z).sqrt(),
        }
    }

    /// Apply the conversion from raw cartesian millimetres reported by the
    /// depth camera: divide by 1000, add `camera_offset`, then transform to
    /// polar. Returns `None` for a "lost" user (`raw_z == 0`).
    pub fn from_raw_mm(raw_mm: Vector3, camera_offset: Vector3) -> Option<Self> {
        if raw_mm.z() == 0.0 {
            return None;
        }
        let metres = raw_mm / 1000.0;
        let offset = metres + camera_offset;
        Some(Self::from_cartesian(offset))
    }
}

/// A snapshot of one tracked person: stable `id`, the timestamp the
/// measurement was taken at (camera-time domain, synchronised to the
/// system clock), the current polar COM, and a smoothed per-axis rate.
///
/// Never mutated in place: a new `TrackedUser` is constructed every frame.
#[derive(Debug, Clone, Copy)]
pub struct TrackedUser {
    pub id: u32,
    pub timestamp: Instant,
    pub com: PolarCoM,
    pub com_rate: PolarCoM,
}

impl TrackedUser {
    pub fn new(id: u32, timestamp: Instant, com: PolarCoM, com_rate: PolarCoM) -> Self {
        Self { id, timestamp, com, com_rate }
    }

    /// A user at rest at the origin at the current instant; used as a
    /// neutral placeholder in tests, never returned by `choose_target`.
    pub fn at_rest(id: u32, timestamp: Instant, com: PolarCoM) -> Self {
        Self { id, timestamp, com, com_rate: PolarCoM::new(0.0, 0.0, 0.0) }
    }
}

/// Per-axis noise floor below which a smoothed rate is zeroed (spec §4.3):
/// 0.75 deg/s yaw, 10 cm/s height, 5 cm/s ground range.
pub struct NoiseFloor {
    pub yaw_rate: f64,
    pub height_rate: f64,
    pub ground_range_rate: f64,
}

impl Default for NoiseFloor {
    fn default() -> Self {
        Self {
            yaw_rate: 0.75_f64.to_radians(),
            height_rate: 0.10,
            ground_range_rate: 0.05,
        }
    }
}

impl NoiseFloor {
    /// Zero any component of `rate` whose magnitude is below this floor.
    pub fn apply(&self, rate: PolarCoM) -> PolarCoM {
        PolarCoM {
            yaw: if rate.yaw.abs() < self.yaw_rate { 0.0 } else { rate.yaw },
            height: if rate.height.abs() < self.height_rate { 0.0 } else { rate.height },
            ground_range: if rate.ground_range.abs() < self.ground_range_rate {
                0.0
            } else {
                rate.ground_range
            },
        }
    }
}
