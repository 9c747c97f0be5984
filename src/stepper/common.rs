// src/stepper/common.rs
//! Shared helpers for the rate-controlled yaw stepper (§4.6) and the
//! position-controlled pitch stepper (§4.7): microstep selection, pin
//! wiring, and the direction-pin polarity convention.
//!
//! Per the resolved open question on direction-pin polarity (spec §9),
//! both axes use this one helper so the convention can never drift
//! between them the way it did in the source: the direction pin is
//! driven high for positive (increasing yaw/angle) motion, low for
//! negative motion.

use std::sync::Arc;

use crate::error::Result;
use crate::gpio::{GpioDriver, PinDirection, PinLevel};

/// Largest microstep number this crate models: `2^5` = 32 microsteps.
pub const MAX_MICROSTEP: u32 = 5;

/// A microstep-select pin is either driven by the host or hard-wired to a
/// fixed level on the board (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrostepPin {
    Controlled(u32),
    Hardwired(bool),
}

/// Pins wired to a DRV8825-style stepper driver.
#[derive(Debug, Clone, Copy)]
pub struct StepperPins {
    pub step: u32,
    pub direction: u32,
    /// DRV8825 `nENABLE`: active low. Driving it high sleeps the driver.
    pub enable: u32,
    pub microstep_select: [MicrostepPin; 3],
}

impl StepperPins {
    /// The largest microstep number constructible given which
    /// microstep-select pins are host-controlled versus hard-wired: `n`
    /// controlled pins select among `2^n` encodings, i.e. microstep numbers
    /// `0..=2^n - 1`, capped at the driver's `MAX_MICROSTEP` ceiling.
    pub fn available_max(&self) -> u32 {
        let controlled = self.microstep_select.iter().filter(|p| matches!(p, MicrostepPin::Controlled(_))).count() as u32;
        (2u32.pow(controlled) - 1).min(MAX_MICROSTEP)
    }

    pub fn controlled_microstep_pins(&self) -> impl Iterator<Item = u32> + '_ {
        self.microstep_select.iter().filter_map(|p| match p {
            MicrostepPin::Controlled(pin) => Some(*pin),
            MicrostepPin::Hardwired(_) => None,
        })
    }
}

/// Choose the smallest microstep number in `0..=available_max` such that
/// `step_size * min_step_freq / 2^m <= |omega|` (spec §4.6): the pulse
/// rate at the chosen resolution stays at or above `min_step_freq`.
pub fn choose_microstep(step_size: f64, min_step_freq: f64, omega_abs: f64, available_max: u32) -> u32 {
    if omega_abs <= 0.0 {
        return available_max;
    }
    let ratio = step_size * min_step_freq / omega_abs;
    if ratio <= 1.0 {
        return 0;
    }
    let m = ratio.log2().ceil();
    (m as u32).min(available_max)
}

/// Drive the direction pin per the fixed polarity convention: high for
/// `value >= 0`, low for `value < 0`.
pub fn set_direction_pin(gpio: &dyn GpioDriver, pin: u32, value: f64) -> Result<()> {
    gpio.gpio_write(pin, PinLevel::from_bool(value >= 0.0))
}

/// Program the host-controlled microstep-select pins for microstep number
/// `m`, one bit per pin; hard-wired pins are left untouched.
pub fn set_microstep_pins(gpio: &dyn GpioDriver, pins: &StepperPins, m: u32) -> Result<()> {
    for (bit, select) in pins.microstep_select.iter().enumerate() {
        if let MicrostepPin::Controlled(pin) = select {
            gpio.gpio_write(*pin, PinLevel::from_bool((m >> bit) & 1 == 1))?;
        }
    }
    Ok(())
}

/// Configure a stepper's pins as outputs at construction time.
pub fn init_pins(gpio: &dyn GpioDriver, pins: &StepperPins) -> Result<()> {
    gpio.gpio_set_direction(pins.step, PinDirection::Output)?;
    gpio.gpio_set_direction(pins.direction, PinDirection::Output)?;
    gpio.gpio_set_direction(pins.enable, PinDirection::Output)?;
    for pin in pins.controlled_microstep_pins() {
        gpio.gpio_set_direction(pin, PinDirection::Output)?;
    }
    // DRV8825 starts asleep.
    gpio.gpio_write(pins.enable, PinLevel::High)?;
    Ok(())
}

pub fn wake_driver(gpio: &dyn GpioDriver, pins: &StepperPins) -> Result<()> {
    gpio.gpio_write(pins.enable, PinLevel::Low)
}

pub fn sleep_driver(gpio: &dyn GpioDriver, pins: &StepperPins) -> Result<()> {
    gpio.gpio_write(pins.enable, PinLevel::High)
}

pub(super) type SharedGpio = Arc<dyn GpioDriver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_microstep_choice() {
        // spec S6: step_size = 1.8deg, min_step_freq = 1000, omega = 10 -> m = 2
        let step_size = 1.8_f64.to_radians();
        let m = choose_microstep(step_size, 1000.0, 10.0, MAX_MICROSTEP);
        assert_eq!(m, 2);
    }

    #[test]
    fn microstep_clips_to_available_max() {
        let step_size = 1.8_f64.to_radians();
        let m = choose_microstep(step_size, 1000.0, 0.01, 2);
        assert_eq!(m, 2);
    }

    #[test]
    fn zero_omega_returns_available_max() {
        assert_eq!(choose_microstep(0.01, 1000.0, 0.0, 5), 5);
    }

    #[test]
    fn available_max_counts_controlled_pins() {
        let pins = StepperPins {
            step: 0,
            direction: 1,
            enable: 2,
            microstep_select: [MicrostepPin::Controlled(3), MicrostepPin::Hardwired(false), MicrostepPin::Controlled(5)],
        };
        // 2 controlled pins -> 2^2 - 1 = 3 selectable microstep numbers.
        assert_eq!(pins.available_max(), 3);
    }

    #[test]
    fn available_max_is_capped_at_max_microstep() {
        let pins = StepperPins {
            step: 0,
            direction: 1,
            enable: 2,
            microstep_select: [MicrostepPin::Controlled(3), MicrostepPin::Controlled(4), MicrostepPin::Controlled(5)],
        };
        // 3 controlled pins -> 2^3 - 1 = 7, but MAX_MICROSTEP caps it at 5.
        assert_eq!(pins.available_max(), MAX_MICROSTEP);
    }
}
