// src/time_util.rs
//! Clock and small numeric helpers shared by the aiming pipeline.
//!
//! Mirrors the host codebase's `TimeManager` in spirit (an `Instant`-based
//! wall clock with exponential smoothing for noisy measurements) but
//! scoped down to what the turret control loop actually needs: a
//! monotonic `now()`, duration/seconds conversions, clamping, and an EMA
//! helper used for the tracker's `average_generation_time`.

use std::time::{Duration, Instant};

/// Thin wrapper around the monotonic steady clock. Exists mostly so call
/// sites read `clock.now()` rather than reaching for `Instant::now()`
/// directly, and so a test can swap in a fixed origin if it ever needs to.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Seconds elapsed since this clock was constructed.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A duration so large it functions as "not yet started" / "runs forever"
/// for plan segments (see spec §3, `SingleMovement::start_time` and the
/// terminal search segment's `duration`).
pub const LARGE_DURATION: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 100);

/// An `Instant` so far in the future it stands for "not yet started" /
/// "never" for plan segment bookkeeping (spec §3).
#[inline]
pub fn far_future(from: Instant) -> Instant {
    from + LARGE_DURATION
}

#[inline]
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(seconds)
    }
}

#[inline]
pub fn duration_to_seconds(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Signed seconds between two instants: positive if `later` is after `earlier`.
#[inline]
pub fn signed_seconds_between(earlier: Instant, later: Instant) -> f64 {
    if later >= earlier {
        (later - earlier).as_secs_f64()
    } else {
        -(earlier - later).as_secs_f64()
    }
}

/// Exponential moving average: `0.95 * old + 0.05 * sample`, parameterised
/// so the tracker's per-field smoothing and the clock-sync's generation
/// time estimate can share one helper.
#[inline]
pub fn ema(old: f64, sample: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * old + alpha * sample
}

#[inline]
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Rate of change of a scalar quantity between two timestamped samples.
#[inline]
pub fn rate_of_change(prev_value: f64, prev_time: Instant, new_value: f64, new_time: Instant) -> f64 {
    let dt = signed_seconds_between(prev_time, new_time);
    if dt.abs() < f64::EPSILON {
        0.0
    } else {
        (new_value - prev_value) / dt
    }
}
