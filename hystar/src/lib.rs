//! Hystar: star sets and the linear queries built on them.
//!
//! A star set is the affine image of a polytope living in generator
//! coefficient space:
//!
//! ```text
//! { center + αᵗ·basis : C·α ≤ g }
//! ```
//!
//! The crate exposes the representation ([`star::StarSet`]), its algebra
//! (intersections, hulls, generator-difference propagation), and the solver
//! seams every geometric query goes through. All solver requests are typed
//! ([`solver::LinearProgram`], [`solver::system::ConstraintSystem`]) and are
//! answered by a pluggable [`solver::LpBackend`]; [`solver::simplex::DenseSimplex`]
//! is the default backend.
//!
//! Example
//! ```
//! use hystar::prelude::*;
//! use nalgebra::dvector;
//!
//! // The square [2, 4] x [2, 4].
//! let star = StarSet::from_rows(
//!     &[3.0, 3.0],
//!     &[vec![1.0, 0.0], vec![0.0, 1.0]],
//!     &[vec![1.0, 0.0], vec![-1.0, 0.0], vec![0.0, 1.0], vec![0.0, -1.0]],
//!     &[1.0, 1.0, 1.0, 1.0],
//! )
//! .unwrap();
//!
//! let solver = FeasibilitySolver::default();
//! let rect = star.overapprox_rectangle(&solver).unwrap();
//! assert!((rect.mins[0] - 2.0).abs() < 1e-9);
//! assert!(star.contains_point(&solver, &dvector![3.0, 3.0]).unwrap());
//! assert!(!star.contains_point(&solver, &dvector![10.0, 10.0]).unwrap());
//! ```

/// Point containment and inflation fitting.
pub mod containment;
/// Linear half-spaces `H·x ≤ g`.
pub mod halfspace;
/// Numeric constants shared by the queries.
pub mod magic;
/// LP requests, statuses, budgets and backends.
pub mod solver;
/// The star-set representation and its algebra.
pub mod star;
/// Error types and small numeric helpers.
pub mod utils;

pub mod prelude {
    //! Convenient re-exports for end users.
    pub use crate::containment::{ContainmentSolver, InflationFit};
    pub use crate::halfspace::HalfSpace;
    pub use crate::solver::{
        CancelToken, Feasibility, FeasibilitySolver, LpBackend, LpOutcome, LpStatus,
        LinearProgram, SolveBudget, Support,
        simplex::DenseSimplex,
        system::{ConstraintSystem, StateRef, VarBound},
    };
    pub use crate::star::{PredicateBuilder, Rect, StarSet};
    pub use crate::utils::error::{StarError, StarResult};
}
