//! Dense two-phase tableau simplex.
//!
//! This is the default [`LpBackend`]. It is meant for the small, dense
//! programs produced by star-set queries (tens to a few hundred variables),
//! not as a general purpose LP engine.
//!
//! Lowering to standard form
//!  - A free variable `x` becomes `x⁺ − x⁻` with both parts nonnegative.
//!  - A variable bounded below by `l` becomes `l + x'`.
//!  - Every row is divided by its largest coefficient magnitude, so the
//!    feasibility tolerance reads in the units of the variables no matter how
//!    far from the origin the right-hand sides sit.
//!  - Every inequality row receives a slack column; rows whose right-hand side
//!    is negative, and every equality row, additionally receive an artificial
//!    column which phase one drives to zero.
//!
//! Pivoting uses Dantzig's rule and switches to Bland's rule after a streak of
//! degenerate pivots, which rules out cycling.
use std::time::Instant;

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::{
    magic::{DEFAULT_FEASIBILITY_TOLERANCE, DEFAULT_PIVOT_TOLERANCE, RHS_ROUNDOFF},
    solver::{LinearProgram, LpBackend, LpOutcome, LpSolution, Sense, SolveBudget, system::VarBound},
};

/// Degenerate pivots tolerated before switching to Bland's rule.
const DEGENERATE_STREAK: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct DenseSimplex {
    /// Entries with magnitude below this are treated as zero when pivoting.
    pub pivot_tolerance: f64,
    /// Absolute tolerance on the phase-one optimum, measured on normalized rows.
    pub feasibility_tolerance: f64,
}

impl Default for DenseSimplex {
    fn default() -> Self {
        Self {
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
            feasibility_tolerance: DEFAULT_FEASIBILITY_TOLERANCE,
        }
    }
}

impl DenseSimplex {
    pub fn with_tolerance(pivot_tolerance: f64) -> Self {
        Self {
            pivot_tolerance,
            ..Self::default()
        }
    }
}

/// How an original variable maps onto tableau columns.
#[derive(Debug, Clone, Copy)]
enum ColumnMap {
    Split { pos: usize, neg: usize },
    Shifted { col: usize, lower: f64 },
}

/// Why the pivoting loop stopped early.
enum Halt {
    Unbounded,
    IterationLimit,
    TimedOut,
    Cancelled,
}

impl From<Halt> for LpOutcome {
    fn from(h: Halt) -> Self {
        match h {
            Halt::Unbounded => LpOutcome::Unbounded,
            Halt::IterationLimit => LpOutcome::IterationLimit,
            Halt::TimedOut => LpOutcome::TimedOut,
            Halt::Cancelled => LpOutcome::Cancelled,
        }
    }
}

struct Tableau<'b> {
    /// Constraint rows followed by the objective row; last column is the right-hand side.
    t: DMatrix<f64>,
    basis: Vec<usize>,
    rows: usize,
    cols: usize,
    first_artificial: usize,
    eps: f64,
    budget: &'b SolveBudget,
    deadline: Option<Instant>,
    iterations: usize,
}

impl<'b> Tableau<'b> {
    fn rhs(&self, r: usize) -> f64 {
        self.t[(r, self.cols)]
    }

    fn is_artificial(&self, col: usize) -> bool {
        col >= self.first_artificial
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let width = self.cols + 1;
        let p = self.t[(r, c)];
        for j in 0..width {
            self.t[(r, j)] /= p;
        }
        for i in 0..=self.rows {
            if i == r {
                continue;
            }
            let f = self.t[(i, c)];
            if f == 0.0 {
                continue;
            }
            for j in 0..width {
                let v = self.t[(r, j)];
                if v != 0.0 {
                    self.t[(i, j)] -= f * v;
                }
            }
        }
        self.basis[r] = c;
    }

    /// Load `costs` into the objective row and price out the current basis.
    fn load_objective(&mut self, costs: &[f64]) {
        let obj = self.rows;
        for j in 0..=self.cols {
            self.t[(obj, j)] = if j < self.cols { costs[j] } else { 0.0 };
        }
        for r in 0..self.rows {
            let cb = costs[self.basis[r]];
            if cb == 0.0 {
                continue;
            }
            for j in 0..=self.cols {
                let v = self.t[(r, j)];
                self.t[(obj, j)] -= cb * v;
            }
        }
    }

    fn check_budget(&self) -> Result<(), Halt> {
        if self.budget.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        if self.iterations >= self.budget.max_iterations {
            return Err(Halt::IterationLimit);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Halt::TimedOut);
            }
        }
        Ok(())
    }

    fn entering(&self, bland: bool) -> Option<usize> {
        let obj = self.rows;
        let mut best: Option<(usize, f64)> = None;
        for j in 0..self.first_artificial {
            let d = self.t[(obj, j)];
            if d >= -self.eps {
                continue;
            }
            if bland {
                return Some(j);
            }
            match best {
                Some((_, bd)) if bd <= d => {}
                _ => best = Some((j, d)),
            }
        }
        best.map(|(j, _)| j)
    }

    fn leaving(&self, c: usize) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for r in 0..self.rows {
            let a = self.t[(r, c)];
            if a <= self.eps {
                continue;
            }
            let ratio = self.rhs(r) / a;
            match best {
                None => best = Some((r, ratio)),
                Some((br, bratio)) => {
                    if ratio < bratio - self.eps
                        || (ratio <= bratio + self.eps && self.basis[r] < self.basis[br])
                    {
                        best = Some((r, ratio));
                    }
                }
            }
        }
        best.map(|(r, _)| r)
    }

    /// Pivot until the objective row has no improving column.
    fn optimize(&mut self) -> Result<(), Halt> {
        let mut degenerate = 0usize;
        loop {
            self.check_budget()?;
            let bland = degenerate >= DEGENERATE_STREAK;
            let Some(c) = self.entering(bland) else {
                return Ok(());
            };
            let Some(r) = self.leaving(c) else {
                return Err(Halt::Unbounded);
            };

            if self.rhs(r).abs() <= self.eps {
                degenerate += 1;
            } else {
                degenerate = 0;
            }
            self.pivot(r, c);
            self.iterations += 1;
        }
    }

    /// Pivot remaining zero-level artificials out of the basis where possible.
    fn expel_artificials(&mut self) {
        for r in 0..self.rows {
            if !self.is_artificial(self.basis[r]) {
                continue;
            }
            let candidate = (0..self.first_artificial).find(|&j| self.t[(r, j)].abs() > self.eps);
            if let Some(j) = candidate {
                self.pivot(r, j);
            }
            // Otherwise the row is redundant and the artificial stays basic at zero.
        }
    }
}

impl LpBackend for DenseSimplex {
    fn solve(&self, program: &LinearProgram, budget: &SolveBudget) -> LpOutcome {
        let nvars = program.num_vars();
        let n_ub = program.a_ub.nrows();
        let n_eq = program.a_eq.nrows();
        let rows = n_ub + n_eq;

        // Structural columns.
        let mut maps = Vec::with_capacity(nvars);
        let mut ncols_struct = 0;
        for bound in &program.bounds {
            match *bound {
                VarBound::Free => {
                    maps.push(ColumnMap::Split {
                        pos: ncols_struct,
                        neg: ncols_struct + 1,
                    });
                    ncols_struct += 2;
                }
                VarBound::AtLeast(lower) => {
                    maps.push(ColumnMap::Shifted {
                        col: ncols_struct,
                        lower,
                    });
                    ncols_struct += 1;
                }
            }
        }

        // Rows in structural coordinates, with right-hand sides shifted by the lower bounds.
        let mut rhs = DVector::zeros(rows);
        let mut coeffs = DMatrix::zeros(rows, ncols_struct);
        for r in 0..rows {
            let (row, b) = if r < n_ub {
                (program.a_ub.row(r), program.b_ub[r])
            } else {
                (program.a_eq.row(r - n_ub), program.b_eq[r - n_ub])
            };
            let norm = row.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            let scale = if norm > 0.0 { norm } else { 1.0 };
            let mut shifted = b;
            for (j, map) in maps.iter().enumerate() {
                let a = row[j];
                match *map {
                    ColumnMap::Split { pos, neg } => {
                        coeffs[(r, pos)] = a / scale;
                        coeffs[(r, neg)] = -a / scale;
                    }
                    ColumnMap::Shifted { col, lower } => {
                        coeffs[(r, col)] = a / scale;
                        shifted -= a * lower;
                    }
                }
            }
            rhs[r] = shifted / scale;
        }

        // Slack and artificial columns.
        let first_slack = ncols_struct;
        let first_artificial = first_slack + n_ub;
        let needs_artificial: Vec<bool> = (0..rows).map(|r| r >= n_ub || rhs[r] < 0.0).collect();
        let n_art = needs_artificial.iter().filter(|x| **x).count();
        let cols = first_artificial + n_art;

        let mut t = DMatrix::zeros(rows + 1, cols + 1);
        let mut basis = vec![0usize; rows];
        let mut next_art = first_artificial;
        for r in 0..rows {
            let flip = if rhs[r] < 0.0 { -1.0 } else { 1.0 };
            for j in 0..ncols_struct {
                t[(r, j)] = flip * coeffs[(r, j)];
            }
            if r < n_ub {
                t[(r, first_slack + r)] = flip;
            }
            t[(r, cols)] = flip * rhs[r];
            if needs_artificial[r] {
                t[(r, next_art)] = 1.0;
                basis[r] = next_art;
                next_art += 1;
            } else {
                basis[r] = first_slack + r;
            }
        }

        let mut tableau = Tableau {
            t,
            basis,
            rows,
            cols,
            first_artificial,
            eps: self.pivot_tolerance,
            budget,
            deadline: budget.deadline(),
            iterations: 0,
        };

        // Phase one: minimize the sum of artificials.
        if n_art > 0 {
            let mut costs = vec![0.0; cols];
            for c in costs.iter_mut().skip(first_artificial) {
                *c = 1.0;
            }
            tableau.load_objective(&costs);
            if let Err(halt) = tableau.optimize() {
                return halt.into();
            }

            let infeasibility = -tableau.t[(rows, cols)];
            let largest = rhs.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if infeasibility > self.feasibility_tolerance + RHS_ROUNDOFF * largest {
                trace!(
                    "Phase one ended with residual infeasibility {:.3e} after {} pivots",
                    infeasibility, tableau.iterations
                );
                return LpOutcome::Infeasible;
            }
            tableau.expel_artificials();
        }

        // Phase two.
        let sign = if program.sense.is_maximize() { -1.0 } else { 1.0 };
        let mut costs = vec![0.0; cols];
        for (j, map) in maps.iter().enumerate() {
            let c = sign * program.objective[j];
            match *map {
                ColumnMap::Split { pos, neg } => {
                    costs[pos] = c;
                    costs[neg] = -c;
                }
                ColumnMap::Shifted { col, .. } => costs[col] = c,
            }
        }
        tableau.load_objective(&costs);
        if let Err(halt) = tableau.optimize() {
            return halt.into();
        }

        // Read back the solution.
        let mut values = vec![0.0; cols];
        for r in 0..rows {
            values[tableau.basis[r]] = tableau.rhs(r);
        }
        let point = DVector::from_iterator(
            nvars,
            maps.iter().map(|map| match *map {
                ColumnMap::Split { pos, neg } => values[pos] - values[neg],
                ColumnMap::Shifted { col, lower } => lower + values[col],
            }),
        );
        let value = program.objective.dot(&point);

        trace!(
            "Simplex converged after {} pivots ({} rows, {} columns)",
            tableau.iterations, rows, cols
        );
        LpOutcome::Optimal(LpSolution { value, point })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::CancelToken;

    fn solve(program: &LinearProgram) -> LpOutcome {
        DenseSimplex::default().solve(program, &SolveBudget::default())
    }

    fn optimal(outcome: LpOutcome) -> LpSolution {
        match outcome {
            LpOutcome::Optimal(sol) => sol,
            other => panic!("expected optimal outcome, got {:?}", other.status()),
        }
    }

    #[test]
    fn textbook_maximization() {
        // max 3x + 5y s.t. x <= 4, 2y <= 12, 3x + 2y <= 18, x, y >= 0
        let mut program = LinearProgram::inequalities(
            Sense::Maximize,
            DVector::from_vec(vec![3.0, 5.0]),
            DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 2.0, 3.0, 2.0]),
            DVector::from_vec(vec![4.0, 12.0, 18.0]),
        );
        program.bounds = vec![VarBound::AtLeast(0.0); 2];

        let sol = optimal(solve(&program));
        assert!((sol.value - 36.0).abs() < 1e-9);
        assert!((sol.point[0] - 2.0).abs() < 1e-9);
        assert!((sol.point[1] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn free_variables_reach_negative_optimum() {
        // min x s.t. -x <= 5 (x >= -5)
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::from_vec(vec![1.0]),
            DMatrix::from_row_slice(1, 1, &[-1.0]),
            DVector::from_vec(vec![5.0]),
        );
        let sol = optimal(solve(&program));
        assert!((sol.point[0] + 5.0).abs() < 1e-9);
    }

    #[test]
    fn detects_infeasible_interval() {
        // x <= -3 and -x <= -2 (x >= 2)
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(1),
            DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
            DVector::from_vec(vec![-3.0, -2.0]),
        );
        assert!(solve(&program).is_infeasible());
    }

    #[test]
    fn far_from_origin_gaps_are_infeasible() {
        // 1e6 <= x <= 1e6 + 1 and x >= 1e6 + 1.05
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(1),
            DMatrix::from_row_slice(3, 1, &[1.0, -1.0, -1.0]),
            DVector::from_vec(vec![1e6 + 1.0, -1e6, -(1e6 + 1.05)]),
        );
        assert!(solve(&program).is_infeasible());

        // Same gap with a row scaled by a large coefficient.
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(1),
            DMatrix::from_row_slice(2, 1, &[1e3, -1.0]),
            DVector::from_vec(vec![1e3 * (1e6 + 1.0), -(1e6 + 1.05)]),
        );
        assert!(solve(&program).is_infeasible());
    }

    #[test]
    fn far_from_origin_boundary_stays_feasible() {
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(1),
            DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
            DVector::from_vec(vec![1e6 + 1.0, -(1e6 + 1.0)]),
        );
        let sol = optimal(solve(&program));
        assert!((sol.point[0] - (1e6 + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn detects_unbounded_direction() {
        let program = LinearProgram::inequalities(
            Sense::Maximize,
            DVector::from_vec(vec![1.0]),
            DMatrix::from_row_slice(1, 1, &[-1.0]),
            DVector::from_vec(vec![0.0]),
        );
        assert!(solve(&program).is_unbounded());
    }

    #[test]
    fn equalities_pin_the_solution() {
        // min x + y s.t. x - y = 1, x <= 3, y >= 0.5 (as -y <= -0.5)
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::from_vec(vec![1.0, 1.0]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]),
            DVector::from_vec(vec![3.0, -0.5]),
        )
        .with_equalities(
            DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
            DVector::from_vec(vec![1.0]),
        );
        let sol = optimal(solve(&program));
        assert!((sol.point[0] - 1.5).abs() < 1e-9);
        assert!((sol.point[1] - 0.5).abs() < 1e-9);
        assert!((sol.value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn redundant_equalities_are_tolerated() {
        let program = LinearProgram::inequalities(
            Sense::Maximize,
            DVector::from_vec(vec![1.0, 0.0]),
            DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            DVector::from_vec(vec![2.0]),
        )
        .with_equalities(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 2.0]),
            DVector::from_vec(vec![1.0, 2.0]),
        );
        let sol = optimal(solve(&program));
        assert!((sol.point[0] - 2.0).abs() < 1e-9);
        assert!((sol.point[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iteration_budget_is_reported() {
        let program = LinearProgram::inequalities(
            Sense::Maximize,
            DVector::from_vec(vec![1.0, 1.0]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
            DVector::from_vec(vec![1.0, 1.0]),
        );
        let budget = SolveBudget {
            max_iterations: 0,
            ..SolveBudget::default()
        };
        let outcome = DenseSimplex::default().solve(&program, &budget);
        assert!(outcome.is_iteration_limit());
    }

    #[test]
    fn cancelled_budget_stops_immediately() {
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(1),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DVector::from_vec(vec![1.0]),
        );
        let cancel = CancelToken::new();
        cancel.cancel();
        let budget = SolveBudget {
            cancel,
            ..SolveBudget::default()
        };
        assert!(DenseSimplex::default().solve(&program, &budget).is_cancelled());
    }

    #[test]
    fn shifted_lower_bounds_are_respected() {
        // min x s.t. x >= 2.5 expressed as a bound, x <= 10
        let mut program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::from_vec(vec![1.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DVector::from_vec(vec![10.0]),
        );
        program.bounds = vec![VarBound::AtLeast(2.5)];
        let sol = optimal(solve(&program));
        assert!((sol.point[0] - 2.5).abs() < 1e-9);
    }
}
