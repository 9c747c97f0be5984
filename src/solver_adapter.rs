// src/solver_adapter.rs
//! Narrow adapter over an LP solver, matching the interface the original
//! system consumes from its simplex solver (spec §6): load a tableau once,
//! mutate row bounds cheaply between solves, and read back optimality /
//! infeasibility flags plus the column solution.
//!
//! Backed by `microlp`, a pure-Rust simplex implementation. `microlp`
//! itself is stateless per solve (it builds its own internal tableau from
//! a variable/constraint list), so this adapter keeps the sparse problem
//! description around and rebuilds the solver's view of it on every
//! `dual()` call — row-bound edits are just slice writes in between.

use microlp::{ComparisonOp, OptimizationDirection, Problem};

/// One row of the tableau: a sparse list of `(variable_index, coefficient)`
/// pairs.
pub type SparseRow = Vec<(usize, f64)>;

pub struct LpModel {
    var_lb: Vec<f64>,
    var_ub: Vec<f64>,
    objective: Vec<f64>,
    rows: Vec<SparseRow>,
    row_lb: Vec<f64>,
    row_ub: Vec<f64>,

    proven_optimal: bool,
    proven_primal_infeasible: bool,
    col_solution: Vec<f64>,
}

impl LpModel {
    /// Load a fresh problem: `objective` and `var_lb`/`var_ub` are per
    /// variable; `rows` paired with `row_lb`/`row_ub` describe
    /// `row_lb[i] <= rows[i] . x <= row_ub[i]` for each row.
    pub fn load_problem(
        rows: Vec<SparseRow>,
        var_lb: Vec<f64>,
        var_ub: Vec<f64>,
        objective: Vec<f64>,
        row_lb: Vec<f64>,
        row_ub: Vec<f64>,
    ) -> Self {
        assert_eq!(var_lb.len(), var_ub.len());
        assert_eq!(var_lb.len(), objective.len());
        assert_eq!(rows.len(), row_lb.len());
        assert_eq!(rows.len(), row_ub.len());
        let num_vars = var_lb.len();
        Self {
            var_lb,
            var_ub,
            objective,
            rows,
            row_lb,
            row_ub,
            proven_optimal: false,
            proven_primal_infeasible: false,
            col_solution: vec![0.0; num_vars],
        }
    }

    pub fn num_vars(&self) -> usize {
        self.var_lb.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn set_row_lower(&mut self, row: usize, value: f64) {
        self.row_lb[row] = value;
    }

    pub fn set_row_upper(&mut self, row: usize, value: f64) {
        self.row_ub[row] = value;
    }

    pub fn set_row_bounds(&mut self, row: usize, lower: f64, upper: f64) {
        self.row_lb[row] = lower;
        self.row_ub[row] = upper;
    }

    /// The LP solver's log level is always silent (spec §4.4); kept as a
    /// no-op method so call sites can still say `set_log_level(0)` as
    /// documented in spec §6.
    pub fn set_log_level(&mut self, _level: u32) {}

    /// Solve (rebuild + run simplex). Populates `is_proven_optimal`,
    /// `is_proven_primal_infeasible` and `get_col_solution`.
    pub fn dual(&mut self) {
        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let vars: Vec<_> = self
            .objective
            .iter()
            .zip(self.var_lb.iter().zip(self.var_ub.iter()))
            .map(|(&coeff, (&lb, &ub))| problem.add_var(coeff, (lb, ub)))
            .collect();

        for (row_idx, row) in self.rows.iter().enumerate() {
            let terms: Vec<(_, f64)> = row.iter().map(|&(vi, c)| (vars[vi], c)).collect();
            let lo = self.row_lb[row_idx];
            let hi = self.row_ub[row_idx];
            if (hi - lo).abs() < 1e-12 {
                problem.add_constraint(&terms, ComparisonOp::Eq, lo);
            } else {
                if lo > f64::NEG_INFINITY {
                    problem.add_constraint(&terms, ComparisonOp::Ge, lo);
                }
                if hi < f64::INFINITY {
                    problem.add_constraint(&terms, ComparisonOp::Le, hi);
                }
            }
        }

        match problem.solve() {
            Ok(solution) => {
                self.proven_optimal = true;
                self.proven_primal_infeasible = false;
                self.col_solution = vars.iter().map(|&v| solution[v]).collect();
            }
            Err(err) => {
                self.proven_optimal = false;
                let message = format!("{:?}", err).to_lowercase();
                self.proven_primal_infeasible = message.contains("infeasible");
            }
        }
    }

    pub fn is_proven_optimal(&self) -> bool {
        self.proven_optimal
    }

    pub fn is_proven_primal_infeasible(&self) -> bool {
        self.proven_primal_infeasible
    }

    pub fn get_col_solution(&self) -> &[f64] {
        &self.col_solution
    }
}
