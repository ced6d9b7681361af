//! Point containment and inflation fitting.
//!
//! Both questions are linear: containment is a feasibility problem in the
//! generator coefficients, and inflation fitting minimizes the scale `mu` of
//! the predicate bounds under which every sample point admits coefficients.
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    magic::MIN_BASIS_DETERMINANT,
    solver::{
        FeasibilitySolver, LpOutcome, LpSolution,
        system::{ConstraintSystem, StateRef, VarBound},
    },
    star::StarSet,
    utils::{
        box_predicate,
        error::{StarError, StarResult},
    },
};

/// Outcome of [`ContainmentSolver::inflate`].
#[derive(Debug, Clone, PartialEq)]
pub struct InflationFit {
    /// `(c, derived_basis, C, mu·g)`.
    pub star: StarSet,
    pub mu: f64,
    /// The reference predicate could not be scaled around the points and the
    /// symmetric predicate `[I; −I]·α ≤ 1` was used instead.
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContainmentSolver {
    solver: FeasibilitySolver,
}

impl From<FeasibilitySolver> for ContainmentSolver {
    fn from(solver: FeasibilitySolver) -> Self {
        Self::new(solver)
    }
}

impl ContainmentSolver {
    pub fn new(solver: FeasibilitySolver) -> Self {
        Self { solver }
    }

    pub fn solver(&self) -> &FeasibilitySolver {
        &self.solver
    }

    /// Whether some `α` with `C·α ≤ g` satisfies `center + Bᵗα = point`.
    pub fn contains(&self, star: &StarSet, point: &DVector<f64>) -> StarResult<bool> {
        let mut system = ConstraintSystem::new();
        star.encode_membership(&mut system, StateRef::Point(point))?;
        match self.solver.run(&system.into_program())? {
            LpOutcome::Optimal(_) => Ok(true),
            LpOutcome::Infeasible => Ok(false),
            other => Err(StarError::UnexpectedSolverStatus {
                context: "point containment",
                status: other.status(),
            }),
        }
    }

    /// Fit a star with generators `derived_basis` around `points`.
    ///
    /// Minimizes `mu ≥ 0` over a free center `c` such that every point is
    /// `c + Bᵗα_p` with `C·α_p ≤ mu·g`, `(C, g)` being the predicate of
    /// `reference`. If no such `mu` exists the fit is retried once with the
    /// symmetric predicate over the same generators.
    pub fn inflate(
        &self,
        reference: &StarSet,
        derived_basis: &DMatrix<f64>,
        points: &[DVector<f64>],
    ) -> StarResult<InflationFit> {
        if points.is_empty() {
            return Err(StarError::EmptyInput("inflation fit"));
        }
        let n = reference.dimension();
        if let Some(bad) = points.iter().find(|p| p.len() != n) {
            return Err(StarError::DimensionMismatch {
                context: "fitted point length",
                expected: n,
                found: bad.len(),
            });
        }
        if derived_basis.nrows() != reference.num_generators() {
            return Err(StarError::DimensionMismatch {
                context: "derived basis generator count",
                expected: reference.num_generators(),
                found: derived_basis.nrows(),
            });
        }
        if derived_basis.ncols() != n {
            return Err(StarError::DimensionMismatch {
                context: "derived basis vector length",
                expected: n,
                found: derived_basis.ncols(),
            });
        }

        let (c, g) = reference.predicate();
        if let Some(fit) = self.fit_with(derived_basis, c, g, points)? {
            return Ok(fit);
        }

        let m = reference.num_generators();
        warn!("Reference predicate cannot enclose {} points, retrying with the symmetric predicate", points.len());
        let (fallback_c, fallback_g) = box_predicate(&DVector::from_element(m, -1.0), &DVector::from_element(m, 1.0));
        match self.fit_with(derived_basis, &fallback_c, &fallback_g, points)? {
            Some(mut fit) => {
                fit.used_fallback = true;
                Ok(fit)
            }
            None => Err(StarError::FitFailed {
                points: points.len(),
                generators: m,
            }),
        }
    }

    /// `Ok(None)` when the program is infeasible.
    fn fit_with(
        &self,
        basis: &DMatrix<f64>,
        c: &DMatrix<f64>,
        g: &DVector<f64>,
        points: &[DVector<f64>],
    ) -> StarResult<Option<InflationFit>> {
        let invertible = basis.is_square() && basis.determinant().abs() >= MIN_BASIS_DETERMINANT;
        let reduced = invertible.then(|| basis.transpose().try_inverse()).flatten();

        let mut system = ConstraintSystem::new();
        let mu = system.add_variable(VarBound::NONNEGATIVE);
        let center = system.add_variables(basis.ncols(), VarBound::Free);

        match &reduced {
            // α_p = B⁻ᵀ(p − c), so C·B⁻ᵀ·p − C·B⁻ᵀ·c − mu·g ≤ 0.
            Some(inv_t) => {
                let projected = c * inv_t;
                for p in points {
                    let rhs = -(&projected * p);
                    for r in 0..projected.nrows() {
                        let terms = center
                            .clone()
                            .map(|j| (j, -projected[(r, j - center.start)]))
                            .chain([(mu, -g[r])]);
                        system.add_le(terms, rhs[r]);
                    }
                }
            }
            None => {
                let (c_rows, m) = (c.nrows(), basis.nrows());
                for p in points {
                    let alpha = system.add_variables(m, VarBound::Free);
                    for i in 0..basis.ncols() {
                        let terms = alpha
                            .clone()
                            .map(|a| (a, basis[(a - alpha.start, i)]))
                            .chain([(center.start + i, 1.0)]);
                        system.add_eq(terms, p[i]);
                    }
                    for r in 0..c_rows {
                        let terms = alpha
                            .clone()
                            .map(|a| (a, c[(r, a - alpha.start)]))
                            .chain([(mu, -g[r])]);
                        system.add_le(terms, 0.0);
                    }
                }
            }
        }
        system.minimize([(mu, 1.0)]);

        debug!(
            "Inflation fit over {} points ({} variables, {} constraints, reduced: {})",
            points.len(),
            system.num_vars(),
            system.num_constraints(),
            reduced.is_some()
        );

        match self.solver.run(&system.into_program())? {
            LpOutcome::Optimal(LpSolution { point, .. }) => {
                let scale = point[mu].max(0.0);
                let new_center = point.rows(center.start, center.len()).into_owned();
                let star = StarSet::new(new_center, basis.clone(), c.clone(), g * scale)?;
                Ok(Some(InflationFit {
                    star,
                    mu: scale,
                    used_fallback: false,
                }))
            }
            LpOutcome::Infeasible => Ok(None),
            other => Err(StarError::UnexpectedSolverStatus {
                context: "inflation fit",
                status: other.status(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::dvector;

    use super::*;
    use crate::star::fixtures::square;

    fn cloud() -> Vec<DVector<f64>> {
        vec![
            dvector![0.0, 0.0],
            dvector![2.0, 0.5],
            dvector![1.0, 1.0],
            dvector![-1.0, 0.25],
        ]
    }

    #[test]
    fn containment_matches_the_box() {
        let solver = ContainmentSolver::default();
        let star = square();
        assert!(solver.contains(&star, &dvector![2.0, 4.0]).unwrap());
        assert!(!solver.contains(&star, &dvector![4.5, 3.0]).unwrap());
        assert!(solver.contains(&star, &dvector![1.0]).unwrap_err().is_dimension_mismatch());
    }

    #[test]
    fn inflation_encloses_every_point() {
        let solver = ContainmentSolver::default();
        let reference = square();
        let basis = DMatrix::identity(2, 2);
        let fit = solver.inflate(&reference, &basis, &cloud()).unwrap();
        assert!(!fit.used_fallback);
        assert!(fit.mu >= 0.0);
        for p in cloud() {
            assert!(fit.star.contains_point(solver.solver(), &p).unwrap());
        }
        // The box must span 3 along x and the unit box has width 2.
        assert!((fit.mu - 1.5).abs() < 1e-6);
    }

    #[test]
    fn reduced_and_generic_paths_agree() {
        let solver = ContainmentSolver::default();
        let rotated = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, -1.0, 1.0]);
        let reduced = solver.inflate(&square(), &rotated, &cloud()).unwrap();
        // Half of the spread of x + y across the cloud.
        assert!((reduced.mu - 0.8125).abs() < 1e-6);

        // A zero third generator forces the generic path without changing the optimum.
        let padded = rotated.clone().insert_row(2, 0.0);
        let (c, g) = box_predicate(&DVector::from_element(3, -1.0), &DVector::from_element(3, 1.0));
        let wide = StarSet::new(DVector::zeros(2), padded.clone(), c, g).unwrap();
        let generic = solver.inflate(&wide, &padded, &cloud()).unwrap();
        assert!((reduced.mu - generic.mu).abs() < 1e-6);
        for p in cloud() {
            assert!(generic.star.contains_point(solver.solver(), &p).unwrap());
        }
    }

    #[test]
    fn fallback_predicate_rescues_a_contradictory_reference() {
        let solver = ContainmentSolver::default();
        // α ≤ mu and α ≥ 2·mu only admits α = 0 at mu = 0.
        let reference = StarSet::from_rows(&[0.0], &[vec![1.0]], &[vec![1.0], vec![-1.0]], &[1.0, -2.0]).unwrap();
        let points = vec![dvector![0.0], dvector![1.0]];
        let fit = solver.inflate(&reference, &DMatrix::identity(1, 1), &points).unwrap();
        assert!(fit.used_fallback);
        assert!((fit.mu - 0.5).abs() < 1e-6);
        for p in &points {
            assert!(fit.star.contains_point(solver.solver(), p).unwrap());
        }
    }

    #[test]
    fn degenerate_generators_fail_even_with_fallback() {
        let solver = ContainmentSolver::default();
        let reference = square();
        // Both generators lie on the x axis, so no y offset can be reached.
        let flat = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 2.0, 0.0]);
        let points = vec![dvector![0.0, 0.0], dvector![0.0, 1.0]];
        let err = solver.inflate(&reference, &flat, &points).unwrap_err();
        assert_eq!(err, StarError::FitFailed { points: 2, generators: 2 });
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let solver = ContainmentSolver::default();
        let reference = square();
        let basis = DMatrix::identity(2, 2);
        assert!(solver.inflate(&reference, &basis, &[]).unwrap_err().is_empty_input());
        assert!(solver.inflate(&reference, &basis, &[dvector![1.0]]).unwrap_err().is_dimension_mismatch());
        assert!(
            solver
                .inflate(&reference, &DMatrix::identity(3, 2), &cloud())
                .unwrap_err()
                .is_dimension_mismatch()
        );
    }
}
