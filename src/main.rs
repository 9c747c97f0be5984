use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, LevelFilter};

use watergun_turret::camera_adapter::{MockFrameSource, RawUser};
use watergun_turret::config::{default_ballistics, default_planner_limits, default_scoring, default_tracker_config};
use watergun_turret::gpio::MockGpio;
use watergun_turret::stepper::{MicrostepPin, StepperPins};
use watergun_turret::vector::Vector3;
use watergun_turret::{Turret, TurretConfig};

fn main() {
    setup_diagnostics();

    info!("starting watergun-turret control daemon");

    if let Err(payload) = panic::catch_unwind(run_demo) {
        error!("turret control loop terminated abruptly: {:?}", payload);
        std::process::exit(1);
    }
}

/// Sets up logging and a crash-dumping panic hook.
fn setup_diagnostics() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) { LevelFilter::Debug } else { LevelFilter::Info })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    // The control loop's own `tracing` spans/events (clock-sync, the
    // controller's stepper-fault warnings) need a subscriber of their own;
    // `env_logger` only drains the `log` facade.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();

        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.as_str(),
                None => "Box<dyn Any>",
            },
        };

        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));

        let crash_msg = format!("=== TURRET CRASH ===\nReason: {msg}\nLocation: {location}\n\nStack Trace:\n{backtrace}");

        eprintln!("\x1b[31;1m{crash_msg}\x1b[0m");

        if let Ok(mut file) = File::create("turret_crash.log") {
            let _ = file.write_all(crash_msg.as_bytes());
            eprintln!("Crash report saved to turret_crash.log");
        }
    }));
}

/// Pin assignments for this demo rig; a real deployment would read these
/// from a config file instead of hard-coding them here.
fn demo_config() -> TurretConfig {
    TurretConfig {
        ballistics: default_ballistics(),
        scoring: default_scoring(),
        planner_limits: default_planner_limits(),
        tracker: default_tracker_config(),
        yaw_pins: StepperPins {
            step: 0,
            direction: 1,
            enable: 2,
            microstep_select: [MicrostepPin::Controlled(3), MicrostepPin::Controlled(4), MicrostepPin::Hardwired(false)],
        },
        yaw_step_size: 1.8_f64.to_radians(),
        yaw_min_step_freq: 1000.0,
        pitch_pins: StepperPins {
            step: 10,
            direction: 11,
            enable: 12,
            microstep_select: [MicrostepPin::Controlled(13), MicrostepPin::Controlled(14), MicrostepPin::Hardwired(false)],
        },
        pitch_step_size: 1.8_f64.to_radians(),
        pitch_min_step_freq: 1000.0,
        pitch_min_step_period: Duration::from_micros(200),
        pitch_max_velocity: 5.0,
        pitch_initial_angle: 0.0,
        solenoid_pin: 20,
    }
}

/// A scripted walk-toward-camera, standing in for a live depth-camera
/// session: 150 frames at 30fps of a single user closing from 6m to ~1m.
fn demo_frame_source() -> MockFrameSource {
    let frame_count = 150;
    let script = (0..frame_count)
        .map(|i| {
            let z_mm = 6000.0 - (i as f64) * 33.0;
            vec![RawUser { id: 1, com_cartesian_mm: Vector3::new(300.0, 0.0, z_mm) }]
        })
        .collect();
    MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, script)
}

fn run_demo() {
    let config = demo_config();
    let gpio = Arc::new(MockGpio::new());
    let frame_source = Box::new(demo_frame_source());

    let turret = Turret::new(config, gpio, frame_source).expect("turret configuration should be valid");
    turret.fire().expect("solenoid should power on");

    std::thread::sleep(Duration::from_secs(5));

    let segment = turret.current_plan_segment();
    info!("demo run finished: yaw_rate={} searching={}", segment.yaw_rate, segment.is_search());

    turret.cease_fire().expect("solenoid should power off");
}
