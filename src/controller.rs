// src/controller.rs
//! The planner loop (spec §4.5): the live `MovementPlan`, a
//! `MotionCompensator` backed by it (closing the dependency-injection loop
//! the tracker only knows about through a trait object), and the worker
//! thread that re-solves the yaw LP and dispatches to the steppers.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::ballistics::{choose_target, BallisticsConfig, ScoringConfig};
use crate::planner::{MotionLp, MovementPlan, PlannerLimits, SingleMovement};
use crate::projection::MotionCompensator;
use crate::stepper::{PitchStepper, YawStepper};
use crate::time_util::{seconds_to_duration, signed_seconds_between};
use crate::tracker::{CancellationToken, Tracker};

pub fn new_shared_plan(now: Instant, search_yaw_velocity: f64) -> Arc<Mutex<MovementPlan>> {
    Arc::new(Mutex::new(MovementPlan::bootstrap(now, search_yaw_velocity)))
}

/// Sums `segment.yaw_rate * overlap_duration` across whatever segments of
/// the live plan fall between two timestamps, so a user observation can be
/// reprojected back into the camera frame after the turret has rotated.
pub struct PlanCompensator {
    plan: Arc<Mutex<MovementPlan>>,
}

impl PlanCompensator {
    pub fn new(plan: Arc<Mutex<MovementPlan>>) -> Self {
        Self { plan }
    }
}

impl MotionCompensator for PlanCompensator {
    fn yaw_rotation_between(&self, earlier: Instant, later: Instant) -> f64 {
        let plan = self.plan.lock().unwrap();
        integrate_yaw(plan.segments(), earlier, later)
    }
}

fn integrate_yaw(segments: &[SingleMovement], earlier: Instant, later: Instant) -> f64 {
    let mut total = 0.0;
    for segment in segments {
        let overlap_start = segment.start_time.max(earlier);
        let overlap_end = segment.end_time().min(later);
        if overlap_end > overlap_start {
            total += segment.yaw_rate * (overlap_end - overlap_start).as_secs_f64();
        }
    }
    total
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub ballistics: BallisticsConfig,
    pub scoring: ScoringConfig,
    pub planner_limits: PlannerLimits,
}

/// Owns the controller worker thread. Dropping it signals the thread to
/// exit and joins it.
pub struct Controller {
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn spawn(
        tracker: Arc<Tracker>,
        plan: Arc<Mutex<MovementPlan>>,
        yaw_stepper: YawStepper,
        pitch_stepper: PitchStepper,
        config: ControllerConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let worker_shutdown = shutdown.clone();
        let motion_lp = MotionLp::new(config.planner_limits);

        let worker = std::thread::Builder::new()
            .name("controller".into())
            .spawn(move || run_loop(tracker, yaw_stepper, pitch_stepper, plan, worker_shutdown, motion_lp, config))
            .expect("failed to spawn controller thread");

        Self { shutdown, worker: Some(worker) }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn dispatch(plan: &MovementPlan, yaw_stepper: &YawStepper, pitch_stepper: &PitchStepper) {
    let current = *plan.current();
    if let Err(err) = yaw_stepper.set_velocity(current.yaw_rate) {
        tracing::warn!(error = %err, "failed to set yaw velocity");
    }
    pitch_stepper.set_position(current.ending_pitch, current.duration);
}

fn run_loop(
    tracker: Arc<Tracker>,
    yaw_stepper: YawStepper,
    pitch_stepper: PitchStepper,
    plan: Arc<Mutex<MovementPlan>>,
    shutdown: CancellationToken,
    mut motion_lp: MotionLp,
    config: ControllerConfig,
) {
    let mut last_seen_frame_id = None;
    dispatch(&plan.lock().unwrap(), &yaw_stepper, &pitch_stepper);

    while !shutdown.is_cancelled() {
        let now = Instant::now();
        let timeout = {
            let current = *plan.lock().unwrap().current();
            if current.is_search() {
                None
            } else {
                let remaining = signed_seconds_between(now, current.end_time()).max(0.0);
                Some(seconds_to_duration(remaining))
            }
        };

        tracker.wait_for_detected_frame(last_seen_frame_id, timeout, &shutdown);
        last_seen_frame_id = Some(tracker.detected_frame_id());
        if shutdown.is_cancelled() {
            break;
        }

        let now = Instant::now();
        let snapshot = tracker.snapshot();
        if let Some(target) = choose_target(&snapshot, &config.ballistics, &config.scoring) {
            let current_yaw_rate = plan.lock().unwrap().current().yaw_rate;
            let movements = motion_lp.solve(target, &config.ballistics, current_yaw_rate, now);
            let mut guard = plan.lock().unwrap();
            guard.replace_future(movements, config.planner_limits.search_yaw_velocity, now);
        }

        let mut guard = plan.lock().unwrap();
        guard.advance(now);
        dispatch(&guard, &yaw_stepper, &pitch_stepper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_adapter::{MockFrameSource, RawUser};
    use crate::gpio::MockGpio;
    use crate::stepper::{MicrostepPin, StepperPins};
    use crate::tracker::TrackerConfig;
    use crate::vector::Vector3;
    use std::time::Duration;

    fn pins(base: u32) -> StepperPins {
        StepperPins {
            step: base,
            direction: base + 1,
            enable: base + 2,
            microstep_select: [
                MicrostepPin::Controlled(base + 3),
                MicrostepPin::Controlled(base + 4),
                MicrostepPin::Hardwired(false),
            ],
        }
    }

    #[test]
    fn integrate_yaw_sums_overlapping_segments() {
        let t0 = Instant::now();
        let segments = vec![
            SingleMovement::new(t0, Duration::from_millis(100), 1.0, 0.0),
            SingleMovement::new(t0 + Duration::from_millis(100), Duration::from_millis(100), -2.0, 0.0),
        ];
        let total = integrate_yaw(&segments, t0, t0 + Duration::from_millis(150));
        // first segment fully covered (0.1 * 1.0) + half of the second (0.05 * -2.0)
        assert!((total - (0.1 - 0.1)).abs() < 1e-9, "{}", total);
    }

    #[test]
    fn controller_drives_steppers_toward_a_stationary_target() {
        let gpio = Arc::new(MockGpio::new());
        let yaw_stepper = YawStepper::new(gpio.clone(), pins(0), 1.8_f64.to_radians(), 1000.0).unwrap();
        let pitch_stepper = PitchStepper::new(
            gpio.clone(),
            pins(10),
            1.8_f64.to_radians(),
            1000.0,
            Duration::from_micros(200),
            5.0,
            0.0,
        )
        .unwrap();

        let now = Instant::now();
        let plan = new_shared_plan(now, 0.2);
        let compensator = Arc::new(PlanCompensator::new(plan.clone()));

        let script = vec![vec![RawUser { id: 1, com_cartesian_mm: Vector3::new(200.0, 0.0, 5000.0) }]; 20];
        let frame_source = Box::new(MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, script));
        let tracker = Arc::new(Tracker::spawn(frame_source, TrackerConfig::default(), compensator));

        let config = ControllerConfig {
            ballistics: BallisticsConfig { water_rate: 30.0, air_resistance: 0.0, gravity: 9.81 },
            scoring: ScoringConfig { h_fov: 1.0, max_depth: 10.0 },
            planner_limits: PlannerLimits {
                max_yaw_velocity: std::f64::consts::PI,
                max_yaw_acceleration: std::f64::consts::PI,
                aim_period: Duration::from_millis(30),
                search_yaw_velocity: 0.2,
            },
        };

        let controller = Controller::spawn(tracker.clone(), plan.clone(), yaw_stepper, pitch_stepper, config);
        std::thread::sleep(Duration::from_millis(300));

        let final_plan = plan.lock().unwrap();
        assert!(!final_plan.current().is_search(), "expected a solved segment to be active");
        drop(final_plan);
        drop(controller);
    }
}
