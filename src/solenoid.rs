// src/solenoid.rs
//! The water valve: a trivial on/off GPIO pin (spec §4.8). No scheduling,
//! no PWM — just power on/off and an idempotent accessor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::gpio::{GpioDriver, PinDirection, PinLevel};

pub struct SolenoidValve {
    gpio: Arc<dyn GpioDriver>,
    pin: u32,
    powered: AtomicBool,
}

impl SolenoidValve {
    pub fn new(gpio: Arc<dyn GpioDriver>, pin: u32) -> Result<Self> {
        gpio.gpio_set_direction(pin, PinDirection::Output)?;
        gpio.gpio_write(pin, PinLevel::Low)?;
        Ok(Self { gpio, pin, powered: AtomicBool::new(false) })
    }

    pub fn power_on(&self) -> Result<()> {
        self.gpio.gpio_write(self.pin, PinLevel::High)?;
        self.powered.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn power_off(&self) -> Result<()> {
        self.gpio.gpio_write(self.pin, PinLevel::Low)?;
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }
}
