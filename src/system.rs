// src/system.rs
//! Top-level orchestrator (spec §5): wires the tracker, the live plan, the
//! controller loop, both steppers, and the solenoid valve into one handle
//! whose lifetime owns every background thread.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::camera_adapter::FrameSource;
use crate::config::TurretConfig;
use crate::controller::{new_shared_plan, Controller, ControllerConfig, PlanCompensator};
use crate::error::Result;
use crate::gpio::GpioDriver;
use crate::planner::{MovementPlan, SingleMovement};
use crate::polar::TrackedUser;
use crate::projection::MotionCompensator;
use crate::solenoid::SolenoidValve;
use crate::stepper::{PitchStepper, YawStepper};
use crate::tracker::Tracker;

/// The whole turret. Dropping it stops the controller loop, joins the
/// tracker and pitch-stepper worker threads, and leaves the solenoid
/// powered off.
pub struct Turret {
    controller: Controller,
    tracker: Arc<Tracker>,
    solenoid: SolenoidValve,
    plan: Arc<Mutex<MovementPlan>>,
}

impl Turret {
    pub fn new(config: TurretConfig, gpio: Arc<dyn GpioDriver>, frame_source: Box<dyn FrameSource>) -> Result<Self> {
        config.validate()?;

        let now = Instant::now();
        let plan = new_shared_plan(now, config.planner_limits.search_yaw_velocity);
        let compensator: Arc<dyn MotionCompensator> = Arc::new(PlanCompensator::new(plan.clone()));
        let tracker = Arc::new(Tracker::spawn(frame_source, config.tracker, compensator));

        let yaw_stepper = YawStepper::new(gpio.clone(), config.yaw_pins, config.yaw_step_size, config.yaw_min_step_freq)?;
        let pitch_stepper = PitchStepper::new(
            gpio.clone(),
            config.pitch_pins,
            config.pitch_step_size,
            config.pitch_min_step_freq,
            config.pitch_min_step_period,
            config.pitch_max_velocity,
            config.pitch_initial_angle,
        )?;
        let solenoid = SolenoidValve::new(gpio, config.solenoid_pin)?;

        let controller_config = ControllerConfig {
            ballistics: config.ballistics,
            scoring: config.scoring,
            planner_limits: config.planner_limits,
        };
        let controller = Controller::spawn(tracker.clone(), plan.clone(), yaw_stepper, pitch_stepper, controller_config);

        Ok(Self { controller, tracker, solenoid, plan })
    }

    pub fn fire(&self) -> Result<()> {
        self.solenoid.power_on()
    }

    pub fn cease_fire(&self) -> Result<()> {
        self.solenoid.power_off()
    }

    pub fn is_firing(&self) -> bool {
        self.solenoid.is_powered()
    }

    pub fn tracked_users(&self) -> Vec<TrackedUser> {
        self.tracker.snapshot()
    }

    pub fn current_plan_segment(&self) -> SingleMovement {
        *self.plan.lock().unwrap().current()
    }
}

impl Drop for Turret {
    fn drop(&mut self) {
        let _ = self.solenoid.power_off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_adapter::MockFrameSource;
    use crate::config::{default_ballistics, default_planner_limits, default_scoring, default_tracker_config};
    use crate::gpio::MockGpio;
    use crate::stepper::{MicrostepPin, StepperPins};
    use std::time::Duration;

    fn pins(base: u32) -> StepperPins {
        StepperPins {
            step: base,
            direction: base + 1,
            enable: base + 2,
            microstep_select: [MicrostepPin::Controlled(base + 3), MicrostepPin::Controlled(base + 4), MicrostepPin::Hardwired(false)],
        }
    }

    fn test_config() -> TurretConfig {
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
    fn rejects_invalid_config_before_spawning_anything() {
        let mut config = test_config();
        config.solenoid_pin = config.yaw_pins.step;
        let gpio = Arc::new(MockGpio::new());
        let frame_source = Box::new(MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, vec![]));
        assert!(Turret::new(config, gpio, frame_source).is_err());
    }

    #[test]
    fn fire_and_cease_fire_toggle_the_solenoid() {
        let gpio = Arc::new(MockGpio::new());
        let frame_source = Box::new(MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, vec![]));
        let turret = Turret::new(test_config(), gpio, frame_source).unwrap();
        assert!(!turret.is_firing());
        turret.fire().unwrap();
        assert!(turret.is_firing());
        turret.cease_fire().unwrap();
        assert!(!turret.is_firing());
    }

    #[test]
    fn starts_on_a_search_segment() {
        let gpio = Arc::new(MockGpio::new());
        let frame_source = Box::new(MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, vec![]));
        let turret = Turret::new(test_config(), gpio, frame_source).unwrap();
        assert!(turret.current_plan_segment().is_search());
    }
}
