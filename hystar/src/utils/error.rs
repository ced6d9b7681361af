use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

use crate::solver::LpStatus;

#[derive(Debug, Clone, PartialEq, EnumIs, EnumTryAs, Error)]
pub enum StarError {
    /// Center, basis and predicate disagree on their shapes.
    #[error(
        "Dimension mismatch in {context}: expected {expected} entries, found {found}. The center, basis and predicate of a star set must agree on their shapes."
    )]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// The LP backend returned something other than optimal or infeasible.
    #[error(
        "Linear program for {context} ended with unexpected status `{status}`. Only optimal and infeasible outcomes are meaningful to this query."
    )]
    UnexpectedSolverStatus {
        context: &'static str,
        status: LpStatus,
    },

    /// Inflation fitting failed against both the reference and the generic predicate.
    #[error(
        "Unable to find an inflation scale enclosing {points} points with {generators} generators, even with the generic symmetric predicate."
    )]
    FitFailed { points: usize, generators: usize },

    /// The operation is not supported for this input.
    #[error("Operation `{0}` is not supported for this star set.")]
    Unsupported(&'static str),

    /// The operation requires at least one input element.
    #[error("Operation `{0}` requires a non-empty input.")]
    EmptyInput(&'static str),

    /// An externally supplied point map (simulation step or reset) failed.
    #[error("Point map failed: {0}")]
    PointMap(String),
}

pub type StarResult<T> = Result<T, StarError>;
