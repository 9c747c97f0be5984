// src/stepper/pitch.rs
//! Position-controlled pitch stepper (spec §4.7): a software-timed pulse
//! train driven from a dedicated worker thread, re-planned on every
//! `set_position` call via a `Mutex`+`Condvar` pair (mirrors the
//! wait/notify/`wait_timeout` idiom the host codebase uses for its asset
//! load futures).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Result;
use crate::gpio::{GpioDriver, PinDirection, PinLevel};
use crate::time_util::clamp;

use super::common::{self, StepperPins};

const EPS_ANGLE: f64 = 1e-9;

struct PitchState {
    current_angle: f64,
    target_angle: f64,
    duration: Duration,
    version: u64,
    shutdown: bool,
}

struct PitchShared {
    state: Mutex<PitchState>,
    condvar: Condvar,
}

pub struct PitchStepper {
    shared: Arc<PitchShared>,
    worker: Option<JoinHandle<()>>,
}

impl PitchStepper {
    pub fn new(
        gpio: Arc<dyn GpioDriver>,
        pins: StepperPins,
        step_size: f64,
        min_step_freq: f64,
        min_step_period: Duration,
        max_velocity: f64,
        initial_angle: f64,
    ) -> Result<Self> {
        common::init_pins(&*gpio, &pins)?;
        let available_max = pins.available_max();

        let shared = Arc::new(PitchShared {
            state: Mutex::new(PitchState {
                current_angle: initial_angle,
                target_angle: initial_angle,
                duration: Duration::from_secs(1),
                version: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("pitch-stepper".into())
            .spawn(move || {
                run_worker(gpio, pins, step_size, min_step_freq, min_step_period, max_velocity, available_max, worker_shared)
            })
            .expect("failed to spawn pitch stepper worker thread");

        Ok(Self { shared, worker: Some(worker) })
    }

    /// Command a new target angle to be reached over `duration`. Wakes the
    /// worker, which re-plans from wherever it currently is.
    pub fn set_position(&self, target_angle: f64, duration: Duration) {
        let mut state = self.shared.state.lock().unwrap();
        state.target_angle = target_angle;
        state.duration = duration;
        state.version += 1;
        drop(state);
        self.shared.condvar.notify_all();
    }

    pub fn current_angle(&self) -> f64 {
        self.shared.state.lock().unwrap().current_angle
    }
}

impl Drop for PitchStepper {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.condvar.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    gpio: Arc<dyn GpioDriver>,
    pins: StepperPins,
    step_size: f64,
    min_step_freq: f64,
    min_step_period: Duration,
    max_velocity: f64,
    available_max: u32,
    shared: Arc<PitchShared>,
) {
    loop {
        let (target, duration, current, version) = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.shutdown {
                    return;
                }
                if (state.target_angle - state.current_angle).abs() < EPS_ANGLE {
                    let _ = common::sleep_driver(&*gpio, &pins);
                    state = shared.condvar.wait(state).unwrap();
                } else {
                    break;
                }
            }
            (state.target_angle, state.duration, state.current_angle, state.version)
        };

        let duration_secs = duration.as_secs_f64().max(f64::EPSILON);
        let omega = clamp((target - current) / duration_secs, -max_velocity, max_velocity);
        if omega == 0.0 {
            continue;
        }

        let m = common::choose_microstep(step_size, min_step_freq, omega.abs(), available_max);
        let delta = omega.signum() * step_size / 2f64.powi(m as i32);
        let period = (delta / omega).abs().max(min_step_period.as_secs_f64());
        let step_count = ((target - current) / delta).abs().round() as u64;

        let _ = common::set_direction_pin(&*gpio, pins.direction, omega);
        let _ = common::set_microstep_pins(&*gpio, &pins, m);
        let _ = common::wake_driver(&*gpio, &pins);

        let half_period = Duration::from_secs_f64(period / 2.0);

        for _ in 0..step_count {
            let _ = gpio.gpio_write(pins.step, PinLevel::High);
            std::thread::sleep(half_period);
            let _ = gpio.gpio_write(pins.step, PinLevel::Low);
            std::thread::sleep(half_period);

            // The two half-period sleeps above already paced this step at
            // `period`; no further waiting is owed before checking in.
            let mut state = shared.state.lock().unwrap();
            state.current_angle += delta;
            let shutting_down = state.shutdown;
            let replanned = state.version != version;
            drop(state);
            if shutting_down {
                return;
            }
            if replanned {
                break;
            }
        }
    }
}

/// Optional calibration (spec §4.7): step in the commanded direction until
/// a homing switch reads low, then report `reference_angle` as the
/// current position. Run synchronously before a `PitchStepper` is
/// constructed (or while its worker is parked), never from the worker
/// thread itself.
pub fn calibrate_against_homing_switch(
    gpio: &dyn GpioDriver,
    pins: &StepperPins,
    step_size: f64,
    min_step_freq: f64,
    homing_pin: u32,
    direction: f64,
    reference_angle: f64,
    max_steps: u32,
) -> Result<f64> {
    gpio.gpio_set_direction(homing_pin, PinDirection::Input)?;
    common::set_direction_pin(gpio, pins.direction, direction)?;
    let m = pins.available_max();
    common::set_microstep_pins(gpio, pins, m)?;
    common::wake_driver(gpio, pins)?;

    let microstep_size = step_size / 2f64.powi(m as i32);
    let _ = microstep_size; // retained for clarity of the timing derivation below
    let half_period = Duration::from_secs_f64(0.5 / min_step_freq);

    for _ in 0..max_steps {
        if !gpio.gpio_read(homing_pin)?.is_high() {
            break;
        }
        gpio.gpio_write(pins.step, PinLevel::High)?;
        std::thread::sleep(half_period);
        gpio.gpio_write(pins.step, PinLevel::Low)?;
        std::thread::sleep(half_period);
    }
    common::sleep_driver(gpio, pins)?;
    Ok(reference_angle)
}
