// src/stepper/yaw.rs
//! Rate-controlled yaw stepper (spec §4.6): drives the step pin as a PWM
//! output rather than a software pulse train, since the commanded rate is
//! constant between plan segments.

use std::sync::Arc;

use crate::error::Result;
use crate::gpio::GpioDriver;

use super::common::{self, StepperPins};

pub struct YawStepper {
    gpio: Arc<dyn GpioDriver>,
    pins: StepperPins,
    step_size: f64,
    min_step_freq: f64,
    available_max: u32,
}

impl YawStepper {
    pub fn new(gpio: Arc<dyn GpioDriver>, pins: StepperPins, step_size: f64, min_step_freq: f64) -> Result<Self> {
        common::init_pins(&*gpio, &pins)?;
        gpio.pwm_enable(pins.step, false)?;
        let available_max = pins.available_max();
        Ok(Self { gpio, pins, step_size, min_step_freq, available_max })
    }

    /// Command an angular rate in rad/s. `omega == 0.0` disables the pulse
    /// output and sleeps the driver.
    pub fn set_velocity(&self, omega: f64) -> Result<()> {
        if omega == 0.0 {
            self.gpio.pwm_enable(self.pins.step, false)?;
            common::sleep_driver(&*self.gpio, &self.pins)?;
            return Ok(());
        }

        let omega_abs = omega.abs();
        let m = common::choose_microstep(self.step_size, self.min_step_freq, omega_abs, self.available_max);
        common::set_direction_pin(&*self.gpio, self.pins.direction, omega)?;
        common::set_microstep_pins(&*self.gpio, &self.pins, m)?;
        common::wake_driver(&*self.gpio, &self.pins)?;

        let microstep_size = self.step_size / 2f64.powi(m as i32);
        let period = microstep_size / omega_abs;
        self.gpio.pwm_set_period(self.pins.step, period)?;
        self.gpio.pwm_set_duty(self.pins.step, 0.5)?;
        self.gpio.pwm_enable(self.pins.step, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{MockGpio, PinLevel};
    use crate::stepper::common::MicrostepPin;

    fn test_pins() -> StepperPins {
        StepperPins {
            step: 0,
            direction: 1,
            enable: 2,
            microstep_select: [MicrostepPin::Controlled(3), MicrostepPin::Controlled(4), MicrostepPin::Controlled(5)],
        }
    }

    #[test]
    fn zero_velocity_disables_pwm_and_sleeps() {
        let gpio = Arc::new(MockGpio::new());
        let stepper = YawStepper::new(gpio.clone(), test_pins(), 1.8_f64.to_radians(), 1000.0).unwrap();
        stepper.set_velocity(5.0).unwrap();
        stepper.set_velocity(0.0).unwrap();
        assert!(!gpio.pwm_is_enabled(0));
        assert_eq!(gpio.gpio_read(2).unwrap(), PinLevel::High);
    }

    #[test]
    fn positive_velocity_drives_direction_high() {
        let gpio = Arc::new(MockGpio::new());
        let stepper = YawStepper::new(gpio.clone(), test_pins(), 1.8_f64.to_radians(), 1000.0).unwrap();
        stepper.set_velocity(10.0).unwrap();
        assert_eq!(gpio.gpio_read(1).unwrap(), PinLevel::High);
        assert!(gpio.pwm_is_enabled(0));
        assert_eq!(gpio.pwm_duty(0), Some(0.5));
    }

    #[test]
    fn negative_velocity_drives_direction_low() {
        let gpio = Arc::new(MockGpio::new());
        let stepper = YawStepper::new(gpio.clone(), test_pins(), 1.8_f64.to_radians(), 1000.0).unwrap();
        stepper.set_velocity(-10.0).unwrap();
        assert_eq!(gpio.gpio_read(1).unwrap(), PinLevel::Low);
    }

    #[test]
    fn pwm_period_matches_s6_geometry() {
        // step_size=1.8deg, min_step_freq=1000, omega=10 -> m=2, period =
        // (step_size/4)/10.
        let gpio = Arc::new(MockGpio::new());
        let step_size = 1.8_f64.to_radians();
        let stepper = YawStepper::new(gpio.clone(), test_pins(), step_size, 1000.0).unwrap();
        stepper.set_velocity(10.0).unwrap();
        let expected_period = (step_size / 4.0) / 10.0;
        assert!((gpio.pwm_period(0).unwrap() - expected_period).abs() < 1e-9);
    }
}
