// src/config.rs
//! Construction-time configuration for the whole turret (spec §3/§6):
//! one `TurretConfig` aggregating every subsystem's parameters, with a
//! single validation pass so a bad pin assignment or a non-positive limit
//! fails loudly at startup instead of misbehaving at runtime.

use std::time::Duration;

use crate::ballistics::{BallisticsConfig, ScoringConfig};
use crate::error::{Result, TurretError};
use crate::planner::PlannerLimits;
use crate::polar::NoiseFloor;
use crate::stepper::StepperPins;
use crate::tracker::TrackerConfig;
use crate::vector::Vector3;

/// Everything needed to construct a `Turret` (see `system.rs`).
#[derive(Debug, Clone)]
pub struct TurretConfig {
    pub ballistics: BallisticsConfig,
    pub scoring: ScoringConfig,
    pub planner_limits: PlannerLimits,
    pub tracker: TrackerConfig,

    pub yaw_pins: StepperPins,
    pub yaw_step_size: f64,
    pub yaw_min_step_freq: f64,

    pub pitch_pins: StepperPins,
    pub pitch_step_size: f64,
    pub pitch_min_step_freq: f64,
    pub pitch_min_step_period: Duration,
    pub pitch_max_velocity: f64,
    pub pitch_initial_angle: f64,

    pub solenoid_pin: u32,
}

impl TurretConfig {
    /// Check the cross-field invariants a single config struct can't
    /// enforce with types alone: distinct pins, positive rates/periods.
    pub fn validate(&self) -> Result<()> {
        let pins = [
            self.yaw_pins.step,
            self.yaw_pins.direction,
            self.yaw_pins.enable,
            self.pitch_pins.step,
            self.pitch_pins.direction,
            self.pitch_pins.enable,
            self.solenoid_pin,
        ];
        for (i, &a) in pins.iter().enumerate() {
            for &b in &pins[i + 1..] {
                if a == b {
                    return Err(TurretError::configuration(format!("pin {a} is assigned to more than one role")));
                }
            }
        }

        if self.planner_limits.aim_period <= Duration::ZERO {
            return Err(TurretError::configuration("aim_period must be positive"));
        }
        if self.planner_limits.max_yaw_velocity <= 0.0 {
            return Err(TurretError::configuration("max_yaw_velocity must be positive"));
        }
        if self.planner_limits.max_yaw_acceleration <= 0.0 {
            return Err(TurretError::configuration("max_yaw_acceleration must be positive"));
        }
        if self.pitch_max_velocity <= 0.0 {
            return Err(TurretError::configuration("pitch_max_velocity must be positive"));
        }
        if self.yaw_step_size <= 0.0 || self.pitch_step_size <= 0.0 {
            return Err(TurretError::configuration("step_size must be positive"));
        }
        if self.yaw_min_step_freq <= 0.0 || self.pitch_min_step_freq <= 0.0 {
            return Err(TurretError::configuration("min_step_freq must be positive"));
        }

        Ok(())
    }
}

/// Reasonable defaults for the sub-configs that don't depend on wiring,
/// matching the constants used in the spec's worked examples (S1-S6).
pub fn default_ballistics() -> BallisticsConfig {
    BallisticsConfig::default()
}

pub fn default_scoring() -> ScoringConfig {
    ScoringConfig { h_fov: 1.0, max_depth: 10.0 }
}

pub fn default_planner_limits() -> PlannerLimits {
    PlannerLimits {
        max_yaw_velocity: std::f64::consts::PI,
        max_yaw_acceleration: std::f64::consts::PI,
        aim_period: Duration::from_millis(30),
        search_yaw_velocity: 0.2,
    }
}

pub fn default_tracker_config() -> TrackerConfig {
    TrackerConfig { camera_offset: Vector3::ZERO, clock_sync_period: 900, noise_floor: NoiseFloor::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::MicrostepPin;

    fn pins(base: u32) -> StepperPins {
        StepperPins {
            step: base,
            direction: base + 1,
            enable: base + 2,
            microstep_select: [MicrostepPin::Controlled(base + 3), MicrostepPin::Controlled(base + 4), MicrostepPin::Hardwired(false)],
        }
    }

    fn valid_config() -> TurretConfig {
        TurretConfig {
            ballistics: default_ballistics(),
            scoring: default_scoring(),
            planner_limits: default_planner_limits(),
            tracker: default_tracker_config(),
            yaw_pins: pins(0),
            yaw_step_size: 1.8_f64.to_radians(),
            yaw_min_step_freq: 1000.0,
            pitch_pins: pins(10),
            pitch_step_size: 1.8_f64.to_radians(),
            pitch_min_step_freq: 1000.0,
            pitch_min_step_period: Duration::from_micros(200),
            pitch_max_velocity: 5.0,
            pitch_initial_angle: 0.0,
            solenoid_pin: 20,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn colliding_pins_are_rejected() {
        let mut config = valid_config();
        config.solenoid_pin = config.yaw_pins.step;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_aim_period_is_rejected() {
        let mut config = valid_config();
        config.planner_limits.aim_period = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
