// src/stepper/mod.rs
//! Axis driver abstractions (spec §9): two independent capability types,
//! `YawStepper` (rate-controlled) and `PitchStepper` (position-controlled),
//! instead of the source's `stepper_base -> pwm_stepper | gpio_stepper`
//! inheritance chain. Shared helpers live in `common`.

pub mod common;
pub mod pitch;
pub mod yaw;

pub use common::{MicrostepPin, StepperPins};
pub use pitch::PitchStepper;
pub use yaw::YawStepper;
