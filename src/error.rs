// src/error.rs
//! Error taxonomy for the turret control system.
//!
//! Deliberately narrow (see spec §7): a configuration error raised at
//! construction time, and a driver/SDK error wrapping whatever the
//! underlying GPIO/PWM/camera call reported. There is no catch-all
//! string variant — every failure mode the system can hit gets a name.

use thiserror::Error;

/// The crate-wide error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurretError {
    /// Invalid construction parameters: a bad pin assignment, a negative
    /// transition duration, a missing camera device, etc.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A GPIO/PWM/camera SDK call returned a non-OK status.
    #[error("driver error during {operation}: {status}")]
    Driver { operation: String, status: String },
}

impl TurretError {
    #[inline]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    #[inline]
    pub fn driver<S: Into<String>, T: Into<String>>(operation: S, status: T) -> Self {
        Self::Driver { operation: operation.into(), status: status.into() }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver { .. })
    }
}

/// Convenient `Result` alias — used everywhere a fallible constructor or
/// driver call needs to surface a `TurretError`.
pub type Result<T> = std::result::Result<T, TurretError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_formats_message() {
        let err = TurretError::configuration("pin 4 is assigned to more than one role");
        assert_eq!(err.to_string(), "configuration error: pin 4 is assigned to more than one role");
        assert!(err.is_configuration());
    }

    #[test]
    fn driver_error_formats_operation_and_status() {
        let err = TurretError::driver("pwm_enable", "EBUSY");
        assert_eq!(err.to_string(), "driver error during pwm_enable: EBUSY");
        assert!(err.is_driver());
    }
}
