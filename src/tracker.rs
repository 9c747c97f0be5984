// src/tracker.rs
//! User table maintenance (spec §4.3): owns the camera session, converts
//! raw skeleton frames into polar `TrackedUser` records with smoothed
//! velocities, and exposes frame-sequence-numbered wait primitives so the
//! planner can block until fresh data arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::camera_adapter::{FrameSource, RawFrame};
use crate::polar::{NoiseFloor, PolarCoM, TrackedUser};
use crate::projection::{project_dynamic, MotionCompensator};
use crate::time_util::{ema, signed_seconds_between};
use crate::vector::Vector3;

/// Cooperative cancellation for tracker waiters (spec §4.3): checked on a
/// bounded poll interval rather than woken instantly, since the tracker's
/// condvar is only ever notified on genuine frame arrival.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

const WAIT_POLL_SLICE: Duration = Duration::from_millis(50);

/// Construction parameters for the tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Added to the depth camera's cartesian centre-of-mass after the
    /// millimetre-to-metre conversion (spec §3).
    pub camera_offset: Vector3,
    /// Frames between clock-sync re-anchors. Defaults to 900.
    pub clock_sync_period: u32,
    pub noise_floor: NoiseFloor,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { camera_offset: Vector3::ZERO, clock_sync_period: 900, noise_floor: NoiseFloor::default() }
    }
}

/// Hardware-clock-ticks (assumed microsecond resolution, matching the
/// depth-camera SDKs this is modeled on) to system-clock `Instant`
/// translation, re-anchored every `clock_sync_period` frames.
struct ClockSync {
    period: u32,
    frames_since_sync: u32,
    anchor_ticks: u64,
    anchor_instant: Instant,
}

impl ClockSync {
    fn new(period: u32) -> Self {
        Self { period, frames_since_sync: period, anchor_ticks: 0, anchor_instant: Instant::now() }
    }

    fn translate(&mut self, ticks: u64, now: Instant) -> Instant {
        if self.frames_since_sync >= self.period {
            self.anchor_ticks = ticks;
            self.anchor_instant = now;
            self.frames_since_sync = 0;
        }
        self.frames_since_sync += 1;
        let delta_ticks = ticks.saturating_sub(self.anchor_ticks);
        self.anchor_instant + Duration::from_micros(delta_ticks)
    }
}

struct TrackerState {
    users: Mutex<Vec<TrackedUser>>,
    condvar: Condvar,
    global_frame_id: AtomicU64,
    detected_frame_id: AtomicU64,
    average_generation_time: Mutex<f64>,
}

/// Owns the camera session (via a `FrameSource`) and a background thread
/// translating raw frames into the shared user table.
pub struct Tracker {
    state: Arc<TrackerState>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Tracker {
    pub fn spawn(
        mut frame_source: Box<dyn FrameSource>,
        config: TrackerConfig,
        compensator: Arc<dyn MotionCompensator>,
    ) -> Self {
        let state = Arc::new(TrackerState {
            users: Mutex::new(Vec::new()),
            condvar: Condvar::new(),
            global_frame_id: AtomicU64::new(0),
            detected_frame_id: AtomicU64::new(0),
            average_generation_time: Mutex::new(0.0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker_state = state.clone();
        let worker_shutdown = shutdown.clone();
        let worker = std::thread::Builder::new()
            .name("tracker".into())
            .spawn(move || {
                let mut clock_sync = ClockSync::new(config.clock_sync_period);
                while !worker_shutdown.load(Ordering::SeqCst) {
                    let Some(frame) = frame_source.next_frame() else { break };
                    process_frame(&worker_state, &config, &mut clock_sync, &*compensator, frame);
                }
            })
            .expect("failed to spawn tracker thread");

        Self { state, shutdown, worker: Some(worker) }
    }

    pub fn snapshot(&self) -> Vec<TrackedUser> {
        self.state.users.lock().unwrap().clone()
    }

    pub fn global_frame_id(&self) -> u64 {
        self.state.global_frame_id.load(Ordering::SeqCst)
    }

    pub fn detected_frame_id(&self) -> u64 {
        self.state.detected_frame_id.load(Ordering::SeqCst)
    }

    pub fn average_generation_time(&self) -> f64 {
        *self.state.average_generation_time.lock().unwrap()
    }

    /// Block until `global_frame_id` has advanced past `last_seen`, the
    /// timeout elapses, or `cancel` is signalled. `None` for `last_seen`
    /// waits for the very first frame.
    pub fn wait_for_any_frame(&self, last_seen: Option<u64>, timeout: Option<Duration>, cancel: &CancellationToken) -> bool {
        self.wait_for(last_seen, timeout, cancel, |s| s.global_frame_id.load(Ordering::SeqCst))
    }

    /// Same as `wait_for_any_frame`, but only counts frames where the
    /// table was non-empty.
    pub fn wait_for_detected_frame(&self, last_seen: Option<u64>, timeout: Option<Duration>, cancel: &CancellationToken) -> bool {
        self.wait_for(last_seen, timeout, cancel, |s| s.detected_frame_id.load(Ordering::SeqCst))
    }

    fn wait_for(
        &self,
        last_seen: Option<u64>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
        counter: impl Fn(&TrackerState) -> u64,
    ) -> bool {
        let last_seen = last_seen.unwrap_or(0);
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.state.users.lock().unwrap();
        loop {
            if counter(&self.state) > last_seen {
                return true;
            }
            if cancel.is_cancelled() {
                return false;
            }
            let slice = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return false;
                    }
                    WAIT_POLL_SLICE.min(dl - now)
                }
                None => WAIT_POLL_SLICE,
            };
            let (g, _) = self.state.condvar.wait_timeout(guard, slice).unwrap();
            guard = g;
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn blend(prev: PolarCoM, instantaneous: PolarCoM) -> PolarCoM {
    PolarCoM::new(
        0.5 * prev.yaw + 0.5 * instantaneous.yaw,
        0.5 * prev.height + 0.5 * instantaneous.height,
        0.5 * prev.ground_range + 0.5 * instantaneous.ground_range,
    )
}

fn process_frame(
    state: &TrackerState,
    config: &TrackerConfig,
    clock_sync: &mut ClockSync,
    compensator: &dyn MotionCompensator,
    frame: RawFrame,
) {
    let now = Instant::now();
    let frame_ts = clock_sync.translate(frame.timestamp_ticks, now);

    {
        let mut avg = state.average_generation_time.lock().unwrap();
        let sample = signed_seconds_between(frame_ts, now);
        *avg = ema(*avg, sample, 0.05);
    }

    let previous = state.users.lock().unwrap().clone();
    let mut table = Vec::with_capacity(frame.users.len());

    for raw in &frame.users {
        let Some(com) = PolarCoM::from_raw_mm(raw.com_cartesian_mm, config.camera_offset) else { continue };

        let tracked = match previous.iter().find(|u| u.id == raw.id) {
            Some(prev) => {
                let raw_observation = TrackedUser::at_rest(raw.id, frame_ts, com);
                let reprojected = project_dynamic(&raw_observation, prev.timestamp, compensator);
                let dt = signed_seconds_between(prev.timestamp, frame_ts);
                let instantaneous_rate = if dt.abs() > f64::EPSILON {
                    PolarCoM::new(
                        (reprojected.com.yaw - prev.com.yaw) / dt,
                        (reprojected.com.height - prev.com.height) / dt,
                        (reprojected.com.ground_range - prev.com.ground_range) / dt,
                    )
                } else {
                    PolarCoM::new(0.0, 0.0, 0.0)
                };
                let blended = blend(prev.com_rate, instantaneous_rate);
                let filtered = config.noise_floor.apply(blended);
                TrackedUser::new(raw.id, frame_ts, com, filtered)
            }
            None => TrackedUser::at_rest(raw.id, frame_ts, com),
        };
        table.push(tracked);
    }

    let detected = !table.is_empty();
    {
        let mut guard = state.users.lock().unwrap();
        *guard = table;
    }
    state.global_frame_id.fetch_add(1, Ordering::SeqCst);
    if detected {
        state.detected_frame_id.fetch_add(1, Ordering::SeqCst);
    }
    state.condvar.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_adapter::{MockFrameSource, RawUser};
    use crate::projection::NoOpCompensator;

    fn user(id: u32, x: f64, y: f64, z: f64) -> RawUser {
        RawUser { id, com_cartesian_mm: Vector3::new(x, y, z) }
    }

    #[test]
    fn lost_user_is_excluded() {
        let source = Box::new(MockFrameSource::new(
            1.0,
            0.8,
            10.0,
            30.0,
            33_333,
            0,
            vec![vec![user(1, 0.0, 0.0, 0.0)]],
        ));
        let tracker = Tracker::spawn(source, TrackerConfig::default(), Arc::new(NoOpCompensator));
        let token = CancellationToken::new();
        assert!(tracker.wait_for_any_frame(None, Some(Duration::from_secs(1)), &token));
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn detected_frame_id_only_advances_on_nonempty_frames() {
        let source = Box::new(MockFrameSource::new(
            1.0,
            0.8,
            10.0,
            30.0,
            33_333,
            0,
            vec![vec![], vec![user(1, 0.0, 0.0, 5000.0)], vec![]],
        ));
        let tracker = Tracker::spawn(source, TrackerConfig::default(), Arc::new(NoOpCompensator));
        let token = CancellationToken::new();
        // wait for all three frames to land
        while tracker.global_frame_id() < 3 {
            tracker.wait_for_any_frame(Some(tracker.global_frame_id()), Some(Duration::from_secs(1)), &token);
        }
        assert_eq!(tracker.global_frame_id(), 3);
        assert_eq!(tracker.detected_frame_id(), 1);
    }

    #[test]
    fn reprojection_tracks_a_moving_user() {
        // A user walking straight toward the camera: z shrinks 500mm per
        // frame at 30fps (~33.3ms/frame) => closing speed ~ -15 m/s, well
        // above the noise floor.
        let source = Box::new(MockFrameSource::new(
            1.0,
            0.8,
            10.0,
            30.0,
            33_333,
            0,
            vec![
                vec![user(1, 0.0, 0.0, 5000.0)],
                vec![user(1, 0.0, 0.0, 4500.0)],
            ],
        ));
        let tracker = Tracker::spawn(source, TrackerConfig::default(), Arc::new(NoOpCompensator));
        let token = CancellationToken::new();
        while tracker.global_frame_id() < 2 {
            tracker.wait_for_any_frame(Some(tracker.global_frame_id()), Some(Duration::from_secs(1)), &token);
        }
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].com_rate.ground_range < 0.0, "{:?}", snapshot[0].com_rate);
    }

    #[test]
    fn wait_times_out_when_no_more_frames_arrive() {
        let source = Box::new(MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, vec![vec![]]));
        let tracker = Tracker::spawn(source, TrackerConfig::default(), Arc::new(NoOpCompensator));
        let token = CancellationToken::new();
        assert!(tracker.wait_for_any_frame(None, Some(Duration::from_millis(200)), &token));
        // no more frames will ever arrive; waiting for a fresher one must time out.
        let timed_out = tracker.wait_for_any_frame(Some(tracker.global_frame_id()), Some(Duration::from_millis(200)), &token);
        assert!(!timed_out);
    }

    #[test]
    fn cancellation_unblocks_an_indefinite_wait() {
        let source = Box::new(MockFrameSource::new(1.0, 0.8, 10.0, 30.0, 33_333, 0, vec![]));
        let tracker = Arc::new(Tracker::spawn(source, TrackerConfig::default(), Arc::new(NoOpCompensator)));
        let token = CancellationToken::new();
        let cancel_token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            cancel_token.cancel();
        });
        let result = tracker.wait_for_any_frame(None, None, &token);
        assert!(!result);
    }
}
