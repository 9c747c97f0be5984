// src/planner.rs
//! The yaw motion plan (spec §3) and the linear-programming planner that
//! fills it in (spec §4.4).

use std::time::{Duration, Instant};

use crate::ballistics::{calculate_aim, Aim, BallisticsConfig};
use crate::polar::TrackedUser;
use crate::projection::project;
use crate::solver_adapter::LpModel;
use crate::time_util::{far_future, seconds_to_duration, signed_seconds_between, LARGE_DURATION};

/// One segment of the yaw/pitch trajectory (spec §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleMovement {
    pub start_time: Instant,
    pub duration: Duration,
    pub yaw_rate: f64,
    pub ending_pitch: f64,
}

impl SingleMovement {
    pub fn new(start_time: Instant, duration: Duration, yaw_rate: f64, ending_pitch: f64) -> Self {
        Self { start_time, duration, yaw_rate, ending_pitch }
    }

    /// The arbitrarily long segment that slews the turret at a fixed
    /// search velocity when no target is selected.
    pub fn search(start_time: Instant, yaw_rate: f64) -> Self {
        Self { start_time, duration: LARGE_DURATION, yaw_rate, ending_pitch: 0.0 }
    }

    pub fn end_time(&self) -> Instant {
        self.start_time + self.duration
    }

    pub fn is_search(&self) -> bool {
        self.duration == LARGE_DURATION
    }
}

/// A logically infinite sequence of `SingleMovement`, indexed by a cursor
/// that always points at the segment containing "now" (spec §3).
///
/// Per the resolved open question on idle-segment bookkeeping (spec §9):
/// the bootstrap segment's `start_time` is stamped to the real clock value
/// at construction rather than carrying the `LARGE`/`0` sentinels the
/// source used inconsistently.
#[derive(Debug, Clone)]
pub struct MovementPlan {
    segments: Vec<SingleMovement>,
    current_movement: usize,
}

impl MovementPlan {
    /// Bootstrap a plan with a single search segment, current as of `now`.
    pub fn bootstrap(now: Instant, initial_search_yaw_velocity: f64) -> Self {
        Self { segments: vec![SingleMovement::search(now, initial_search_yaw_velocity)], current_movement: 0 }
    }

    pub fn current(&self) -> &SingleMovement {
        &self.segments[self.current_movement]
    }

    pub fn current_index(&self) -> usize {
        self.current_movement
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[SingleMovement] {
        &self.segments
    }

    /// Planner loop step 4: drop everything after the cursor, append the
    /// freshly solved `future`, then append a terminal search segment
    /// whose direction follows the sign of the last planned yaw rate.
    pub fn replace_future(&mut self, future: Vec<SingleMovement>, search_yaw_velocity: f64, now: Instant) {
        self.segments.truncate(self.current_movement + 1);
        let last_rate = future
            .last()
            .map(|m| m.yaw_rate)
            .unwrap_or(self.segments[self.current_movement].yaw_rate);
        self.segments.extend(future);
        let sign = if last_rate < 0.0 { -1.0 } else { 1.0 };
        self.segments.push(SingleMovement::search(far_future(now), sign * search_yaw_velocity));
    }

    /// Planner loop step 5: advance the cursor by one, stamping the new
    /// current segment's `start_time` and back-filling the segment just
    /// left with its actual elapsed duration. A no-op if the cursor is
    /// already on the last (terminal search) segment.
    pub fn advance(&mut self, now: Instant) -> bool {
        if self.current_movement + 1 >= self.segments.len() {
            return false;
        }
        let prev_start = self.segments[self.current_movement].start_time;
        let elapsed = signed_seconds_between(prev_start, now).max(0.0);
        self.segments[self.current_movement].duration = seconds_to_duration(elapsed);
        self.current_movement += 1;
        self.segments[self.current_movement].start_time = now;
        true
    }
}

/// Velocity / acceleration / timing limits the planner must respect.
#[derive(Debug, Clone, Copy)]
pub struct PlannerLimits {
    pub max_yaw_velocity: f64,
    pub max_yaw_acceleration: f64,
    pub aim_period: Duration,
    pub search_yaw_velocity: f64,
}

const INITIAL_N_MAX: usize = 8;
const GROWTH_FACTOR: usize = 2;
const MAX_N_MAX: usize = 512;

/// Sparse-row positions inside the reused LP tableau, recomputed whenever
/// the model is rebuilt at a larger horizon.
#[derive(Debug, Clone)]
struct Layout {
    n: usize,
    delta: f64,
    accel_rows: Vec<usize>,
    terminal_accel_row: usize,
    tracking_rows: Vec<(usize, usize)>,
}

/// The "resizable motion LP" (spec §9): owns an `LpModel` sized for some
/// horizon `N` and reuses it across solves, only mutating row bounds.
/// Grown (rebuilt at a larger `N`) and retried when a solve comes back
/// infeasible.
pub struct MotionLp {
    limits: PlannerLimits,
    layout: Layout,
    model: LpModel,
}

impl MotionLp {
    pub fn new(limits: PlannerLimits) -> Self {
        Self::with_horizon(limits, INITIAL_N_MAX)
    }

    /// Construct with an explicit starting horizon; mainly useful in tests
    /// that want to observe growth behaviour from a known baseline.
    pub fn with_horizon(limits: PlannerLimits, n: usize) -> Self {
        let (layout, model) = Self::build(n, &limits);
        Self { limits, layout, model }
    }

    fn build(n: usize, limits: &PlannerLimits) -> (Layout, LpModel) {
        let delta = limits.aim_period.as_secs_f64();
        let num_vars = 2 * n;
        let mut var_lb = vec![0.0; num_vars];
        let mut var_ub = vec![0.0; num_vars];
        let mut objective = vec![0.0; num_vars];
        for i in 0..n {
            var_lb[i] = -limits.max_yaw_velocity;
            var_ub[i] = limits.max_yaw_velocity;
            var_lb[n + i] = 0.0;
            var_ub[n + i] = f64::INFINITY;
            // Later-period slack dominates earlier-period slack in the
            // objective, per spec §4.4's `w_i = 1000*(i+1)` convention.
            objective[n + i] = 1000.0 * (i as f64 + 1.0);
        }

        let mut rows = Vec::new();
        let mut row_lb = Vec::new();
        let mut row_ub = Vec::new();

        let mut accel_rows = Vec::with_capacity(n);
        for i in 0..n {
            if i == 0 {
                rows.push(vec![(0, 1.0)]);
            } else {
                rows.push(vec![(i, 1.0), (i - 1, -1.0)]);
            }
            row_lb.push(0.0);
            row_ub.push(0.0);
            accel_rows.push(rows.len() - 1);
        }

        rows.push(vec![(n - 1, 1.0)]);
        row_lb.push(0.0);
        row_ub.push(0.0);
        let terminal_accel_row = rows.len() - 1;

        let mut tracking_rows = Vec::with_capacity(n);
        for i in 0..n {
            let mut pos: Vec<(usize, f64)> = (0..=i).map(|j| (j, delta)).collect();
            pos.push((n + i, -1.0));
            rows.push(pos);
            row_lb.push(f64::NEG_INFINITY);
            row_ub.push(0.0);
            let pos_row = rows.len() - 1;

            let mut neg: Vec<(usize, f64)> = (0..=i).map(|j| (j, -delta)).collect();
            neg.push((n + i, -1.0));
            rows.push(neg);
            row_lb.push(f64::NEG_INFINITY);
            row_ub.push(0.0);
            let neg_row = rows.len() - 1;

            tracking_rows.push((pos_row, neg_row));
        }

        // Terminal alignment: the horizon's last slack must be exactly
        // zero (spec §4.4's `t[N-1] = 0`).
        rows.push(vec![(n + n - 1, 1.0)]);
        row_lb.push(0.0);
        row_ub.push(0.0);

        let model = LpModel::load_problem(rows, var_lb, var_ub, objective, row_lb, row_ub);
        (Layout { n, delta, accel_rows, terminal_accel_row, tracking_rows }, model)
    }

    fn grow(&mut self) {
        let grown = (self.layout.n * GROWTH_FACTOR).min(MAX_N_MAX);
        let (layout, model) = Self::build(grown, &self.limits);
        self.layout = layout;
        self.model = model;
    }

    /// Solve the yaw LP for `user`, returning `N` `SingleMovement`s
    /// covering `[now, now + N*aim_period)`. Grows the horizon and
    /// retries on infeasibility; if even the largest horizon is
    /// infeasible, falls back to a single search segment so the turret
    /// keeps moving rather than stalling.
    pub fn solve(
        &mut self,
        user: &TrackedUser,
        ballistics: &BallisticsConfig,
        current_yaw_rate: f64,
        now: Instant,
    ) -> Vec<SingleMovement> {
        loop {
            if let Some(movements) = self.try_solve(user, ballistics, current_yaw_rate, now) {
                return movements;
            }
            if self.layout.n >= MAX_N_MAX {
                let sign = if current_yaw_rate < 0.0 { -1.0 } else { 1.0 };
                return vec![SingleMovement::search(now, sign * self.limits.search_yaw_velocity)];
            }
            self.grow();
        }
    }

    fn try_solve(
        &mut self,
        user: &TrackedUser,
        ballistics: &BallisticsConfig,
        current_yaw_rate: f64,
        now: Instant,
    ) -> Option<Vec<SingleMovement>> {
        let n = self.layout.n;
        let delta = self.layout.delta;
        let max_acc = self.limits.max_yaw_acceleration;

        let mut target_yaw = Vec::with_capacity(n);
        let mut target_pitch = Vec::with_capacity(n);
        let mut fallback_yaw = user.com.yaw;
        let mut fallback_pitch = 0.0;
        for i in 0..n {
            let t_target = now + seconds_to_duration(delta * (i as f64 + 1.0));
            let projected = project(user, t_target);
            match calculate_aim(&projected, ballistics) {
                Aim::Reachable(pos) => {
                    fallback_yaw = pos.yaw;
                    fallback_pitch = pos.pitch;
                }
                Aim::Unreachable => {}
            }
            target_yaw.push(fallback_yaw);
            target_pitch.push(fallback_pitch);
        }

        let accel_bound = max_acc * delta;
        self.model.set_row_bounds(
            self.layout.accel_rows[0],
            current_yaw_rate - accel_bound,
            current_yaw_rate + accel_bound,
        );
        for &row in &self.layout.accel_rows[1..] {
            self.model.set_row_bounds(row, -accel_bound, accel_bound);
        }

        let terminal_rate = if n >= 2 {
            (target_yaw[n - 1] - target_yaw[n - 2]) / delta
        } else {
            0.0
        };
        self.model.set_row_bounds(
            self.layout.terminal_accel_row,
            terminal_rate - accel_bound,
            terminal_rate + accel_bound,
        );

        for (i, &(pos_row, neg_row)) in self.layout.tracking_rows.iter().enumerate() {
            self.model.set_row_upper(pos_row, target_yaw[i]);
            self.model.set_row_upper(neg_row, -target_yaw[i]);
        }

        self.model.set_log_level(0);
        self.model.dual();
        if !self.model.is_proven_optimal() {
            return None;
        }

        let solution = self.model.get_col_solution();
        let mut movements = Vec::with_capacity(n);
        for i in 0..n {
            movements.push(SingleMovement::new(
                user.timestamp + seconds_to_duration(delta * i as f64),
                seconds_to_duration(delta),
                solution[i],
                target_pitch[i],
            ));
        }
        Some(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polar::PolarCoM;

    fn stationary_user(yaw: f64, height: f64, range: f64) -> TrackedUser {
        TrackedUser::at_rest(1, Instant::now(), PolarCoM::new(yaw, height, range))
    }

    #[test]
    fn bootstrap_plan_has_single_search_segment() {
        let now = Instant::now();
        let plan = MovementPlan::bootstrap(now, 0.5);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.current_index(), 0);
        assert!(plan.current().is_search());
        assert_eq!(plan.current().start_time, now);
    }

    #[test]
    fn advance_backfills_duration_and_moves_cursor() {
        let t0 = Instant::now();
        let mut plan = MovementPlan::bootstrap(t0, 0.0);
        plan.replace_future(
            vec![SingleMovement::new(t0, Duration::from_millis(30), 0.5, 0.1)],
            0.3,
            t0,
        );
        assert_eq!(plan.len(), 3); // idle (now history) + 1 future + terminal search
        let t1 = t0 + Duration::from_millis(30);
        assert!(plan.advance(t1));
        assert_eq!(plan.current_index(), 1);
        assert_eq!(plan.segments()[0].duration, Duration::from_millis(30));
        assert_eq!(plan.current().start_time, t1);
    }

    #[test]
    fn replace_future_terminal_search_follows_last_sign() {
        let t0 = Instant::now();
        let mut plan = MovementPlan::bootstrap(t0, 0.0);
        plan.replace_future(
            vec![SingleMovement::new(t0, Duration::from_millis(30), -0.8, 0.0)],
            0.3,
            t0,
        );
        let last = plan.segments().last().unwrap();
        assert!(last.is_search());
        assert!((last.yaw_rate + 0.3).abs() < 1e-9);
    }

    #[test]
    fn advance_is_noop_on_terminal_segment() {
        let t0 = Instant::now();
        let mut plan = MovementPlan::bootstrap(t0, 0.2);
        assert!(!plan.advance(t0 + Duration::from_millis(5)));
        assert_eq!(plan.current_index(), 0);
    }

    #[test]
    fn s4_plan_respects_acceleration_limit() {
        // spec S4: current rate 0, max_yaw_velocity = pi, max_yaw_acceleration
        // = pi, aim_period = 30ms, target requiring ~1 rad total. At these
        // numbers the acceleration ramp (not the velocity cap) is what
        // limits how fast the plan can close on the target, so reaching the
        // target exactly (the hard `t[N-1] = 0` terminal constraint) forces
        // the horizon to grow well past the naive 10-period guess; what
        // must hold regardless of the final horizon length is that no two
        // consecutive periods change yaw_rate by more than the acceleration
        // bound, and that the plan ends up on target.
        let limits = PlannerLimits {
            max_yaw_velocity: std::f64::consts::PI,
            max_yaw_acceleration: std::f64::consts::PI,
            aim_period: Duration::from_millis(30),
            search_yaw_velocity: 0.2,
        };
        let mut lp = MotionLp::new(limits);
        let user = stationary_user(1.0, 0.0, 5.0);
        let ballistics = BallisticsConfig { water_rate: 30.0, air_resistance: 0.0, gravity: 9.81 };
        let now = Instant::now();
        let movements = lp.solve(&user, &ballistics, 0.0, now);
        assert!(movements.len() > 10, "expected the horizon to grow, got {}", movements.len());

        let max_delta = limits.max_yaw_acceleration * limits.aim_period.as_secs_f64();
        let mut prev_rate = 0.0;
        let mut cumulative_angle = 0.0;
        for m in &movements {
            assert!((m.yaw_rate - prev_rate).abs() <= max_delta + 1e-6, "{} {}", m.yaw_rate, prev_rate);
            cumulative_angle += m.yaw_rate * limits.aim_period.as_secs_f64();
            prev_rate = m.yaw_rate;
        }
        assert!((cumulative_angle - 1.0).abs() < 1e-2, "cumulative={}", cumulative_angle);
    }

    #[test]
    fn infeasible_horizon_grows_until_solvable() {
        // A distant target with a tight velocity cap cannot be reached
        // exactly (the terminal constraint pins t[N-1] = 0) within a short
        // horizon; the planner must grow N until the horizon is long
        // enough to cover the angle at the velocity cap.
        let limits = PlannerLimits {
            max_yaw_velocity: 0.2,
            max_yaw_acceleration: 10.0,
            aim_period: Duration::from_millis(50),
            search_yaw_velocity: 0.1,
        };
        let mut lp = MotionLp::with_horizon(limits, 8);
        let user = stationary_user(1.0, 0.0, 5.0);
        let ballistics = BallisticsConfig { water_rate: 30.0, air_resistance: 0.0, gravity: 9.81 };
        let now = Instant::now();
        let movements = lp.solve(&user, &ballistics, 0.0, now);
        assert!(movements.len() > 8, "expected growth beyond initial horizon, got {}", movements.len());

        let cumulative_angle: f64 =
            movements.iter().map(|m| m.yaw_rate * limits.aim_period.as_secs_f64()).sum();
        assert!((cumulative_angle - 1.0).abs() < 0.05, "cumulative={}", cumulative_angle);
    }
}
