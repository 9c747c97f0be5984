// src/gpio.rs
//! The GPIO/PWM primitive surface the stepper and solenoid drivers are
//! built on (spec §6). The real SDK is explicitly out of scope; this
//! module only defines the seam and an in-memory test double.

use std::collections::HashMap;

use crate::error::{Result, TurretError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinLevel {
    #[default]
    Low,
    High,
}

impl PinLevel {
    pub fn from_bool(high: bool) -> Self {
        if high { PinLevel::High } else { PinLevel::Low }
    }

    pub fn is_high(self) -> bool {
        matches!(self, PinLevel::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    Up,
    Down,
    None,
}

/// The primitive GPIO/PWM surface every stepper and the solenoid driver
/// consume. A real backend wraps a hardware SDK; `MockGpio` wraps a plain
/// pin table for tests.
pub trait GpioDriver: Send + Sync {
    fn gpio_set_direction(&self, pin: u32, direction: PinDirection) -> Result<()>;
    fn gpio_write(&self, pin: u32, level: PinLevel) -> Result<()>;
    fn gpio_read(&self, pin: u32) -> Result<PinLevel>;
    fn gpio_set_pull(&self, pin: u32, pull: PullMode) -> Result<()>;
    fn pwm_set_period(&self, pin: u32, seconds: f64) -> Result<()>;
    fn pwm_set_duty(&self, pin: u32, fraction: f64) -> Result<()>;
    fn pwm_enable(&self, pin: u32, enabled: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
struct PinState {
    direction: Option<PinDirection>,
    level: PinLevel,
    pull: Option<PullMode>,
    pwm_period: Option<f64>,
    pwm_duty: Option<f64>,
    pwm_enabled: bool,
}

/// An in-memory pin table standing in for a real GPIO/PWM chip. Reads
/// reflect whatever was last written; there is no simulated hardware
/// behind it (no pull-resistor defaults, no PWM signal generation).
pub struct MockGpio {
    pins: parking_lot::Mutex<HashMap<u32, PinState>>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self { pins: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Test hook: force a pin's read value without going through
    /// `gpio_write`, e.g. to simulate a homing switch closing.
    pub fn set_input_level(&self, pin: u32, level: PinLevel) {
        self.pins.lock().entry(pin).or_default().level = level;
    }

    pub fn pwm_duty(&self, pin: u32) -> Option<f64> {
        self.pins.lock().get(&pin).and_then(|p| p.pwm_duty)
    }

    pub fn pwm_period(&self, pin: u32) -> Option<f64> {
        self.pins.lock().get(&pin).and_then(|p| p.pwm_period)
    }

    pub fn pwm_is_enabled(&self, pin: u32) -> bool {
        self.pins.lock().get(&pin).map(|p| p.pwm_enabled).unwrap_or(false)
    }
}

impl Default for MockGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioDriver for MockGpio {
    fn gpio_set_direction(&self, pin: u32, direction: PinDirection) -> Result<()> {
        self.pins.lock().entry(pin).or_default().direction = Some(direction);
        Ok(())
    }

    fn gpio_write(&self, pin: u32, level: PinLevel) -> Result<()> {
        self.pins.lock().entry(pin).or_default().level = level;
        Ok(())
    }

    fn gpio_read(&self, pin: u32) -> Result<PinLevel> {
        Ok(self.pins.lock().get(&pin).map(|p| p.level).unwrap_or_default())
    }

    fn gpio_set_pull(&self, pin: u32, pull: PullMode) -> Result<()> {
        self.pins.lock().entry(pin).or_default().pull = Some(pull);
        Ok(())
    }

    fn pwm_set_period(&self, pin: u32, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(TurretError::driver("pwm_set_period", "non-positive period"));
        }
        self.pins.lock().entry(pin).or_default().pwm_period = Some(seconds);
        Ok(())
    }

    fn pwm_set_duty(&self, pin: u32, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(TurretError::driver("pwm_set_duty", "duty out of [0, 1]"));
        }
        self.pins.lock().entry(pin).or_default().pwm_duty = Some(fraction);
        Ok(())
    }

    fn pwm_enable(&self, pin: u32, enabled: bool) -> Result<()> {
        self.pins.lock().entry(pin).or_default().pwm_enabled = enabled;
        Ok(())
    }
}

/// Raspberry Pi GPIO backend, left as a construction-only stub: real
/// hardware access is out of scope, but the seam documents how a `rppal`
/// backend would be wired in behind the same `GpioDriver` trait.
#[cfg(target_os = "linux")]
pub struct RppalGpio {
    _chip: rppal::gpio::Gpio,
}

#[cfg(target_os = "linux")]
impl RppalGpio {
    pub fn open() -> Result<Self> {
        let chip = rppal::gpio::Gpio::new()
            .map_err(|e| TurretError::driver("rppal::gpio::Gpio::new", e.to_string()))?;
        Ok(Self { _chip: chip })
    }
}

#[cfg(target_os = "linux")]
impl GpioDriver for RppalGpio {
    fn gpio_set_direction(&self, _pin: u32, _direction: PinDirection) -> Result<()> {
        Err(TurretError::driver("gpio_set_direction", "rppal backend not implemented"))
    }

    fn gpio_write(&self, _pin: u32, _level: PinLevel) -> Result<()> {
        Err(TurretError::driver("gpio_write", "rppal backend not implemented"))
    }

    fn gpio_read(&self, _pin: u32) -> Result<PinLevel> {
        Err(TurretError::driver("gpio_read", "rppal backend not implemented"))
    }

    fn gpio_set_pull(&self, _pin: u32, _pull: PullMode) -> Result<()> {
        Err(TurretError::driver("gpio_set_pull", "rppal backend not implemented"))
    }

    fn pwm_set_period(&self, _pin: u32, _seconds: f64) -> Result<()> {
        Err(TurretError::driver("pwm_set_period", "rppal backend not implemented"))
    }

    fn pwm_set_duty(&self, _pin: u32, _fraction: f64) -> Result<()> {
        Err(TurretError::driver("pwm_set_duty", "rppal backend not implemented"))
    }

    fn pwm_enable(&self, _pin: u32, _enabled: bool) -> Result<()> {
        Err(TurretError::driver("pwm_enable", "rppal backend not implemented"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_gpio_roundtrips_writes() {
        let gpio = MockGpio::new();
        gpio.gpio_write(4, PinLevel::High).unwrap();
        assert_eq!(gpio.gpio_read(4).unwrap(), PinLevel::High);
    }

    #[test]
    fn unread_pin_defaults_low() {
        let gpio = MockGpio::new();
        assert_eq!(gpio.gpio_read(99).unwrap(), PinLevel::Low);
    }

    #[test]
    fn pwm_rejects_out_of_range_duty() {
        let gpio = MockGpio::new();
        assert!(gpio.pwm_set_duty(0, 1.5).is_err());
        assert!(gpio.pwm_set_duty(0, -0.1).is_err());
        assert!(gpio.pwm_set_duty(0, 0.5).is_ok());
    }

    #[test]
    fn pwm_state_is_observable() {
        let gpio = MockGpio::new();
        gpio.pwm_set_period(1, 0.002).unwrap();
        gpio.pwm_set_duty(1, 0.5).unwrap();
        gpio.pwm_enable(1, true).unwrap();
        assert_eq!(gpio.pwm_period(1), Some(0.002));
        assert_eq!(gpio.pwm_duty(1), Some(0.5));
        assert!(gpio.pwm_is_enabled(1));
    }

    #[test]
    fn homing_switch_simulation() {
        let gpio = MockGpio::new();
        gpio.set_input_level(7, PinLevel::High);
        assert_eq!(gpio.gpio_read(7).unwrap(), PinLevel::High);
        gpio.set_input_level(7, PinLevel::Low);
        assert_eq!(gpio.gpio_read(7).unwrap(), PinLevel::Low);
    }
}
