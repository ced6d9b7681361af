//! Solver-backed queries over a star set.
//!
//! Every query takes the [`FeasibilitySolver`] explicitly; stars never hold a
//! solver and never cache an answer.
use std::f64::consts::TAU;

use nalgebra::DVector;

use crate::{
    containment::ContainmentSolver,
    halfspace::HalfSpace,
    magic::VERTEX_DIRECTION_SAMPLES,
    solver::{Feasibility, FeasibilitySolver},
    star::{Rect, StarSet},
    utils::error::{StarError, StarResult},
};

impl StarSet {
    fn check_dimension(&self, context: &'static str, found: usize) -> StarResult<()> {
        if found != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context,
                expected: self.dimension(),
                found,
            });
        }
        Ok(())
    }

    /// Lower and upper bound of the star along state dimension `i`.
    pub fn get_max_min(&self, solver: &FeasibilitySolver, i: usize) -> StarResult<(f64, f64)> {
        if i >= self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "bounded dimension index",
                expected: self.dimension(),
                found: i + 1,
            });
        }

        let coeffs: DVector<f64> = self.basis().column(i).into_owned();
        let (c, g) = self.predicate();
        let low = solver.minimize(&coeffs, c, g)?;
        let high = solver.support(&coeffs, c, g)?;
        Ok((
            self.center()[i] + coeffs.dot(&low.point),
            self.center()[i] + coeffs.dot(&high.point),
        ))
    }

    /// Tightest axis-aligned box around the star.
    pub fn overapprox_rectangle(&self, solver: &FeasibilitySolver) -> StarResult<Rect> {
        let n = self.dimension();
        let mut mins = DVector::zeros(n);
        let mut maxes = DVector::zeros(n);
        for i in 0..n {
            let (lo, hi) = self.get_max_min(solver, i)?;
            mins[i] = lo;
            maxes[i] = hi;
        }
        Ok(Rect { mins, maxes })
    }

    /// Midpoint of the bounding box, as opposed to the stored center.
    pub fn true_center(&self, solver: &FeasibilitySolver) -> StarResult<DVector<f64>> {
        Ok(self.overapprox_rectangle(solver)?.center())
    }

    /// Point of the star maximizing `directionᵗ·x`.
    pub fn maximize(&self, solver: &FeasibilitySolver, direction: &DVector<f64>) -> StarResult<DVector<f64>> {
        self.check_dimension("optimization direction", direction.len())?;
        let domain_direction = self.basis() * direction;
        let (c, g) = self.predicate();
        let best = solver.support(&domain_direction, c, g)?;
        Ok(self.point_at(&best.point))
    }

    /// Approximate boundary of the projection on `(dim1, dim2)`.
    ///
    /// Maximizes along unit directions at evenly spaced angles on `[0, 2π]` and
    /// repeats the first vertex to close the polygon. The polygon is an inner
    /// approximation of the projection, not a tight one.
    pub fn get_verts(&self, solver: &FeasibilitySolver, dim1: usize, dim2: usize) -> StarResult<Vec<(f64, f64)>> {
        self.center_point(dim1, dim2)?;

        let samples = VERTEX_DIRECTION_SAMPLES;
        let mut verts = Vec::with_capacity(samples + 1);
        for s in 0..samples {
            let angle = TAU * s as f64 / (samples - 1) as f64;
            let mut direction = DVector::zeros(self.dimension());
            direction[dim1] = angle.cos();
            direction[dim2] += angle.sin();
            let pt = self.maximize(solver, &direction)?;
            verts.push((pt[dim1], pt[dim2]));
        }
        if let Some(first) = verts.first().copied() {
            verts.push(first);
        }
        Ok(verts)
    }

    /// `true` iff the predicate admits no coefficient vector.
    pub fn is_empty(&self, solver: &FeasibilitySolver) -> StarResult<bool> {
        let (c, g) = self.predicate();
        Ok(solver.feasibility(c, g, None)?.is_infeasible())
    }

    /// `true` iff the whole star lies in `{ x : H·x ≤ g }`.
    ///
    /// Decided by checking that the star intersected with `−H·x ≤ −g` is empty,
    /// so a star touching the boundary from inside is reported as not satisfying.
    pub fn satisfies(&self, solver: &FeasibilitySolver, halfspace: &HalfSpace) -> StarResult<bool> {
        self.check_dimension("half-space normal", halfspace.dimension())?;
        let outside = self.intersection_halfspace(&halfspace.negated())?;
        outside.is_empty(solver)
    }

    /// Exact membership test for a single point.
    pub fn contains_point(&self, solver: &FeasibilitySolver, point: &DVector<f64>) -> StarResult<bool> {
        ContainmentSolver::new(solver.clone()).contains(self, point)
    }

    /// Classify emptiness without collapsing the answer to a boolean.
    pub fn feasibility(&self, solver: &FeasibilitySolver) -> StarResult<Feasibility> {
        let (c, g) = self.predicate();
        solver.feasibility(c, g, None)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, dvector};

    use super::*;
    use crate::star::fixtures::{cube, square};

    #[test]
    fn square_bounds_and_membership() {
        let solver = FeasibilitySolver::default();
        let star = square();
        let rect = star.overapprox_rectangle(&solver).unwrap();
        assert!((rect.mins - dvector![2.0, 2.0]).amax() < 1e-9);
        assert!((rect.maxes - dvector![4.0, 4.0]).amax() < 1e-9);
        assert!(star.contains_point(&solver, &dvector![3.0, 3.0]).unwrap());
        assert!(!star.contains_point(&solver, &dvector![10.0, 10.0]).unwrap());
    }

    #[test]
    fn emptiness_classification() {
        let solver = FeasibilitySolver::default();
        let c = DMatrix::from_row_slice(2, 1, &[1.0, -1.0]);
        // α ≤ 1 and α ≥ 2 cannot both hold.
        let contradictory = StarSet::new(dvector![0.0], DMatrix::identity(1, 1), c.clone(), dvector![1.0, -2.0]);
        assert!(contradictory.unwrap().is_empty(&solver).unwrap());

        let empty = StarSet::new(dvector![0.0], DMatrix::identity(1, 1), c.clone(), dvector![-3.0, -2.0]).unwrap();
        assert!(empty.is_empty(&solver).unwrap());

        let nonempty = StarSet::new(dvector![0.0], DMatrix::identity(1, 1), c, dvector![3.0, -2.0]).unwrap();
        assert!(!nonempty.is_empty(&solver).unwrap());
    }

    #[test]
    fn satisfies_uses_the_complement() {
        let solver = FeasibilitySolver::default();
        let star = square();
        assert!(star.satisfies(&solver, &HalfSpace::new(dvector![1.0, 0.0], 10.0)).unwrap());
        assert!(!star.satisfies(&solver, &HalfSpace::new(dvector![1.0, 0.0], -2.0)).unwrap());
        assert!(!star.satisfies(&solver, &HalfSpace::new(dvector![1.0, 0.0], 3.0)).unwrap());
    }

    #[test]
    fn maximize_reaches_the_corner() {
        let solver = FeasibilitySolver::default();
        let pt = square().maximize(&solver, &dvector![1.0, 1.0]).unwrap();
        assert!((pt - dvector![4.0, 4.0]).amax() < 1e-9);
    }

    #[test]
    fn vertices_close_the_polygon_and_stay_in_the_box() {
        let solver = FeasibilitySolver::default();
        let star = cube(3, -1.0, 1.0);
        let verts = star.get_verts(&solver, 0, 2).unwrap();
        assert_eq!(verts.len(), VERTEX_DIRECTION_SAMPLES + 1);
        assert_eq!(verts.first(), verts.last());
        assert!(verts.iter().all(|(x, y)| x.abs() <= 1.0 + 1e-9 && y.abs() <= 1.0 + 1e-9));
    }

    #[test]
    fn out_of_range_dimension_is_reported() {
        let solver = FeasibilitySolver::default();
        assert!(square().get_max_min(&solver, 2).unwrap_err().is_dimension_mismatch());
        assert!(square().get_verts(&solver, 0, 5).unwrap_err().is_dimension_mismatch());
    }

    #[test]
    fn unbounded_support_is_fatal() {
        let solver = FeasibilitySolver::default();
        let half_line = StarSet::from_rows(&[0.0], &[vec![1.0]], &[vec![-1.0]], &[0.0]).unwrap();
        let err = half_line.overapprox_rectangle(&solver).unwrap_err();
        assert!(err.is_unexpected_solver_status());
    }
}
