//! Typed linear-programming requests and the backend seam.
//!
//! Every geometric query of a star set lowers to a [`LinearProgram`] and is
//! answered by an [`LpBackend`]. Backends return an [`LpOutcome`]; the
//! [`FeasibilitySolver`] is the only place that interprets those outcomes, and
//! it refuses to coerce anything but `Optimal`/`Infeasible` into an answer.
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::trace;
use nalgebra::{DMatrix, DVector};
use strum::{EnumDiscriminants, EnumIs};

use crate::{
    magic::DEFAULT_MAX_ITERATIONS,
    solver::{simplex::DenseSimplex, system::VarBound},
    utils::error::{StarError, StarResult},
};

pub mod simplex;
pub mod system;

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIs)]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

/// A linear program in inequality/equality form.
///
/// ```text
/// optimize   objectiveᵗ·x
/// subject to a_ub·x ≤ b_ub
///            a_eq·x = b_eq
///            x_i satisfies bounds[i]
/// ```
///
/// Empty constraint blocks are represented by matrices with zero rows.
#[derive(Debug, Clone)]
pub struct LinearProgram {
    pub sense: Sense,
    pub objective: DVector<f64>,
    pub a_ub: DMatrix<f64>,
    pub b_ub: DVector<f64>,
    pub a_eq: DMatrix<f64>,
    pub b_eq: DVector<f64>,
    pub bounds: Vec<VarBound>,
}

impl LinearProgram {
    /// Program over free variables with only inequality constraints.
    pub fn inequalities(sense: Sense, objective: DVector<f64>, a_ub: DMatrix<f64>, b_ub: DVector<f64>) -> Self {
        let nvars = objective.len();
        Self {
            sense,
            objective,
            a_ub,
            b_ub,
            a_eq: DMatrix::zeros(0, nvars),
            b_eq: DVector::zeros(0),
            bounds: vec![VarBound::Free; nvars],
        }
    }

    /// Attach an equality block.
    pub fn with_equalities(mut self, a_eq: DMatrix<f64>, b_eq: DVector<f64>) -> Self {
        self.a_eq = a_eq;
        self.b_eq = b_eq;
        self
    }

    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }

    /// Check that all blocks agree on the number of variables and rows.
    pub fn validate(&self) -> StarResult<()> {
        let n = self.num_vars();
        let checks = [
            ("LP inequality matrix width", n, self.a_ub.ncols()),
            ("LP inequality right-hand side", self.a_ub.nrows(), self.b_ub.len()),
            ("LP equality matrix width", n, self.a_eq.ncols()),
            ("LP equality right-hand side", self.a_eq.nrows(), self.b_eq.len()),
            ("LP variable bounds", n, self.bounds.len()),
        ];
        for (context, expected, found) in checks {
            if expected != found {
                return Err(StarError::DimensionMismatch {
                    context,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// Optimal value and the point attaining it.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub value: f64,
    pub point: DVector<f64>,
}

/// Result reported by an [`LpBackend`].
#[derive(Debug, Clone, PartialEq, EnumIs, EnumDiscriminants)]
#[strum_discriminants(name(LpStatus))]
#[strum_discriminants(derive(Hash))]
pub enum LpOutcome {
    Optimal(LpSolution),
    Infeasible,
    Unbounded,
    /// The pivot budget of [`SolveBudget::max_iterations`] was exhausted.
    IterationLimit,
    TimedOut,
    Cancelled,
}

impl LpStatus {
    /// Convert to string representation.
    pub fn to_str(&self) -> &'static str {
        match self {
            LpStatus::Optimal => "optimal",
            LpStatus::Infeasible => "infeasible",
            LpStatus::Unbounded => "unbounded",
            LpStatus::IterationLimit => "iteration-limit",
            LpStatus::TimedOut => "timed-out",
            LpStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

impl LpOutcome {
    pub fn status(&self) -> LpStatus {
        self.into()
    }
}

/// Cooperative cancellation flag shared between a caller and running solves.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Resource limits applied to every individual solve.
#[derive(Debug, Clone)]
pub struct SolveBudget {
    pub timeout: Option<Duration>,
    pub max_iterations: usize,
    pub cancel: CancelToken,
}

impl Default for SolveBudget {
    fn default() -> Self {
        Self {
            timeout: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel: CancelToken::new(),
        }
    }
}

impl SolveBudget {
    /// Deadline for a solve starting now.
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }
}

/// Pluggable LP backend.
///
/// Implementations must be pure with respect to the request: every call owns
/// its own solver context, which is what allows independent queries to run
/// concurrently.
pub trait LpBackend: Send + Sync {
    fn solve(&self, program: &LinearProgram, budget: &SolveBudget) -> LpOutcome;
}

/// Classification of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIs)]
pub enum Feasibility {
    Feasible,
    Infeasible,
}

/// Optimum of a linear functional over a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Support {
    pub value: f64,
    pub point: DVector<f64>,
}

/// Feasibility and support queries over predicates `C·α ≤ g`.
#[derive(Clone)]
pub struct FeasibilitySolver {
    backend: Arc<dyn LpBackend>,
    budget: SolveBudget,
}

impl Default for FeasibilitySolver {
    fn default() -> Self {
        Self::new(Arc::new(DenseSimplex::default()), SolveBudget::default())
    }
}

impl std::fmt::Debug for FeasibilitySolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeasibilitySolver")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl FeasibilitySolver {
    pub fn new(backend: Arc<dyn LpBackend>, budget: SolveBudget) -> Self {
        Self { backend, budget }
    }

    pub fn budget(&self) -> &SolveBudget {
        &self.budget
    }

    pub fn backend(&self) -> &Arc<dyn LpBackend> {
        &self.backend
    }

    /// Send a validated request to the backend.
    pub fn run(&self, program: &LinearProgram) -> StarResult<LpOutcome> {
        program.validate()?;
        let outcome = self.backend.solve(program, &self.budget);
        trace!(
            "LP over {} variables ({} inequalities, {} equalities) finished with status {}",
            program.num_vars(),
            program.a_ub.nrows(),
            program.a_eq.nrows(),
            outcome.status()
        );
        Ok(outcome)
    }

    /// Decide whether `C·α ≤ g` (and optionally `A_eq·α = b_eq`) admits a solution.
    pub fn feasibility(
        &self,
        c: &DMatrix<f64>,
        g: &DVector<f64>,
        equalities: Option<(&DMatrix<f64>, &DVector<f64>)>,
    ) -> StarResult<Feasibility> {
        let mut program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(c.ncols()),
            c.clone(),
            g.clone(),
        );
        if let Some((a_eq, b_eq)) = equalities {
            program = program.with_equalities(a_eq.clone(), b_eq.clone());
        }

        match self.run(&program)? {
            LpOutcome::Optimal(_) => Ok(Feasibility::Feasible),
            LpOutcome::Infeasible => Ok(Feasibility::Infeasible),
            other => Err(StarError::UnexpectedSolverStatus {
                context: "feasibility check",
                status: other.status(),
            }),
        }
    }

    /// Maximize `directionᵗ·α` subject to `C·α ≤ g`.
    pub fn support(
        &self,
        direction: &DVector<f64>,
        c: &DMatrix<f64>,
        g: &DVector<f64>,
    ) -> StarResult<Support> {
        self.optimize(Sense::Maximize, direction, c, g, "support query")
    }

    /// Minimize `objectiveᵗ·α` subject to `C·α ≤ g`.
    pub fn minimize(
        &self,
        objective: &DVector<f64>,
        c: &DMatrix<f64>,
        g: &DVector<f64>,
    ) -> StarResult<Support> {
        self.optimize(Sense::Minimize, objective, c, g, "minimization query")
    }

    fn optimize(
        &self,
        sense: Sense,
        objective: &DVector<f64>,
        c: &DMatrix<f64>,
        g: &DVector<f64>,
        context: &'static str,
    ) -> StarResult<Support> {
        if objective.len() != c.ncols() {
            return Err(StarError::DimensionMismatch {
                context,
                expected: c.ncols(),
                found: objective.len(),
            });
        }

        let program = LinearProgram::inequalities(sense, objective.clone(), c.clone(), g.clone());
        match self.run(&program)? {
            LpOutcome::Optimal(LpSolution { value, point }) => Ok(Support { value, point }),
            other => Err(StarError::UnexpectedSolverStatus {
                context,
                status: other.status(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that always answers with the same outcome.
    struct Fixed(LpOutcome);

    impl LpBackend for Fixed {
        fn solve(&self, _program: &LinearProgram, _budget: &SolveBudget) -> LpOutcome {
            self.0.clone()
        }
    }

    fn interval() -> (DMatrix<f64>, DVector<f64>) {
        (
            DMatrix::from_row_slice(2, 1, &[1.0, -1.0]),
            DVector::from_vec(vec![1.0, -2.0]),
        )
    }

    #[test]
    fn unexpected_status_is_never_a_classification() {
        let (c, g) = interval();
        for outcome in [LpOutcome::Unbounded, LpOutcome::TimedOut, LpOutcome::Cancelled] {
            let solver = FeasibilitySolver::new(Arc::new(Fixed(outcome.clone())), SolveBudget::default());
            let err = solver.feasibility(&c, &g, None).unwrap_err();
            assert_eq!(
                err,
                StarError::UnexpectedSolverStatus {
                    context: "feasibility check",
                    status: outcome.status(),
                }
            );
        }
    }

    #[test]
    fn support_rejects_wrong_direction_length() {
        let (c, g) = interval();
        let solver = FeasibilitySolver::default();
        let err = solver.support(&DVector::from_vec(vec![1.0, 0.0]), &c, &g).unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[test]
    fn status_display_is_kebab_case() {
        assert_eq!(LpStatus::IterationLimit.to_string(), "iteration-limit");
        assert_eq!(LpOutcome::Infeasible.status(), LpStatus::Infeasible);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn malformed_program_is_rejected_before_solving() {
        let program = LinearProgram::inequalities(
            Sense::Minimize,
            DVector::zeros(2),
            DMatrix::zeros(1, 3),
            DVector::zeros(1),
        );
        let err = FeasibilitySolver::default().run(&program).unwrap_err();
        assert!(err.is_dimension_mismatch());
    }
}
