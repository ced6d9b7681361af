//! Set operations producing new star sets.
use std::ops::Range;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::{
    halfspace::HalfSpace,
    solver::{
        FeasibilitySolver, LpStatus,
        system::{ConstraintSystem, StateRef, VarBound},
    },
    star::{Rect, StarSet},
    utils::{
        error::{StarError, StarResult},
        vconcat, vstack,
    },
};

/// Accumulates half-space constraints and builds one intersected star.
///
/// ```
/// use hystar::prelude::*;
/// use nalgebra::dvector;
///
/// let star = StarSet::rect_to_star(&dvector![0.0, 0.0], &dvector![2.0, 2.0]).unwrap();
/// let cut = PredicateBuilder::new(&star)
///     .halfspace(HalfSpace::new(dvector![1.0, 0.0], 1.0))
///     .halfspace(HalfSpace::new(dvector![0.0, 1.0], 1.0))
///     .build()
///     .unwrap();
/// assert_eq!(cut.num_constraints(), star.num_constraints() + 2);
/// ```
#[derive(Debug, Clone)]
pub struct PredicateBuilder<'a> {
    star: &'a StarSet,
    halfspaces: Vec<HalfSpace>,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(star: &'a StarSet) -> Self {
        Self {
            star,
            halfspaces: Vec::new(),
        }
    }

    pub fn halfspace(mut self, halfspace: HalfSpace) -> Self {
        self.halfspaces.push(halfspace);
        self
    }

    pub fn halfspaces(mut self, halfspaces: impl IntoIterator<Item = HalfSpace>) -> Self {
        self.halfspaces.extend(halfspaces);
        self
    }

    pub fn len(&self) -> usize {
        self.halfspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.halfspaces.is_empty()
    }

    pub fn build(self) -> StarResult<StarSet> {
        let n = self.star.dimension();
        let mut a = DMatrix::zeros(self.halfspaces.len(), n);
        let mut b = DVector::zeros(self.halfspaces.len());
        for (row, h) in self.halfspaces.iter().enumerate() {
            if h.dimension() != n {
                return Err(StarError::DimensionMismatch {
                    context: "half-space normal",
                    expected: n,
                    found: h.dimension(),
                });
            }
            a.row_mut(row).copy_from(&h.normal.transpose());
            b[row] = h.bound;
        }
        self.star.intersection_poly(&a, &b)
    }
}

impl StarSet {
    /// Star restricted to `{ x : A·x ≤ b }`.
    ///
    /// With `x = center + Bᵗα` the new predicate rows are `A·Bᵗ·α ≤ b − A·center`.
    pub fn intersection_poly(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> StarResult<StarSet> {
        if a.ncols() != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "polytope constraint width",
                expected: self.dimension(),
                found: a.ncols(),
            });
        }
        if a.nrows() != b.len() {
            return Err(StarError::DimensionMismatch {
                context: "polytope right-hand side",
                expected: a.nrows(),
                found: b.len(),
            });
        }

        let (c, g) = self.predicate();
        let new_c = a * self.basis().transpose();
        let new_g = b - a * self.center();
        StarSet::new(
            self.center().clone(),
            self.basis().clone(),
            vstack(c, &new_c),
            vconcat(g, &new_g),
        )
    }

    /// Star restricted to a single half-space.
    pub fn intersection_halfspace(&self, halfspace: &HalfSpace) -> StarResult<StarSet> {
        if halfspace.dimension() != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "half-space normal",
                expected: self.dimension(),
                found: halfspace.dimension(),
            });
        }
        let a = DMatrix::from_row_slice(1, self.dimension(), halfspace.normal.as_slice());
        self.intersection_poly(&a, &DVector::from_element(1, halfspace.bound))
    }

    /// Exact intersection of two stars of the same dimension.
    ///
    /// The result lives over the coefficients `(α, β)` of both operands. It keeps
    /// the center and generators of `self` (the generators of `other` contribute
    /// zero rows) and ties both parametrizations together with
    /// `B₁ᵗα − B₂ᵗβ = c₂ − c₁`, written as a pair of inequalities.
    pub fn intersect(&self, other: &StarSet) -> StarResult<StarSet> {
        if other.dimension() != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "intersected star dimension",
                expected: self.dimension(),
                found: other.dimension(),
            });
        }

        let n = self.dimension();
        let (m1, m2) = (self.num_generators(), other.num_generators());
        let (k1, k2) = (self.num_constraints(), other.num_constraints());
        let (c1, g1) = self.predicate();
        let (c2, g2) = other.predicate();

        let mut basis = DMatrix::zeros(m1 + m2, n);
        basis.rows_mut(0, m1).copy_from(self.basis());

        let mut c = DMatrix::zeros(k1 + k2 + 2 * n, m1 + m2);
        c.view_mut((0, 0), (k1, m1)).copy_from(c1);
        c.view_mut((k1, m1), (k2, m2)).copy_from(c2);

        let b1_t = self.basis().transpose();
        let b2_t = other.basis().transpose();
        let offset = k1 + k2;
        c.view_mut((offset, 0), (n, m1)).copy_from(&b1_t);
        c.view_mut((offset, m1), (n, m2)).copy_from(&(-&b2_t));
        c.view_mut((offset + n, 0), (n, m1)).copy_from(&(-&b1_t));
        c.view_mut((offset + n, m1), (n, m2)).copy_from(&b2_t);

        let shift = other.center() - self.center();
        let g = vconcat(&vconcat(g1, g2), &vconcat(&shift, &(-&shift)));

        StarSet::new(self.center().clone(), basis, c, g)
    }

    /// Exact convex hull of two bounded stars.
    ///
    /// Every hull point is `λ·x₁ + (1 − λ)·x₂`. Substituting `a₁ = λα₁` and
    /// `a₂ = (1 − λ)α₂` gives the star centered at `c₂` with generators
    /// `[c₁ − c₂; B₁; B₂]` over `(λ, a₁, a₂)` and predicate
    ///
    /// ```text
    /// C₁·a₁ − λ·g₁ ≤ 0
    /// C₂·a₂ + λ·g₂ ≤ g₂
    /// 0 ≤ λ ≤ 1
    /// ```
    ///
    /// An empty operand returns the other one unchanged. Unbounded operands are
    /// reported as [`StarError::Unsupported`].
    pub fn convex_hull(&self, other: &StarSet, solver: &FeasibilitySolver) -> StarResult<StarSet> {
        if other.dimension() != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "hulled star dimension",
                expected: self.dimension(),
                found: other.dimension(),
            });
        }
        if self.is_empty(solver)? {
            return Ok(other.clone());
        }
        if other.is_empty(solver)? {
            return Ok(self.clone());
        }
        for star in [self, other] {
            match star.overapprox_rectangle(solver) {
                Ok(_) => {}
                Err(StarError::UnexpectedSolverStatus {
                    status: LpStatus::Unbounded,
                    ..
                }) => {
                    return Err(StarError::Unsupported("convex_hull of an unbounded star"));
                }
                Err(e) => return Err(e),
            }
        }

        let n = self.dimension();
        let (m1, m2) = (self.num_generators(), other.num_generators());
        let (k1, k2) = (self.num_constraints(), other.num_constraints());
        let (c1, g1) = self.predicate();
        let (c2, g2) = other.predicate();
        let m = 1 + m1 + m2;

        let mut basis = DMatrix::zeros(m, n);
        basis
            .row_mut(0)
            .copy_from(&(self.center() - other.center()).transpose());
        basis.rows_mut(1, m1).copy_from(self.basis());
        basis.rows_mut(1 + m1, m2).copy_from(other.basis());

        let mut c = DMatrix::zeros(k1 + k2 + 2, m);
        let mut g = DVector::zeros(k1 + k2 + 2);
        c.view_mut((0, 0), (k1, 1)).copy_from(&(-g1));
        c.view_mut((0, 1), (k1, m1)).copy_from(c1);
        c.view_mut((k1, 0), (k2, 1)).copy_from(g2);
        c.view_mut((k1, 1 + m1), (k2, m2)).copy_from(c2);
        g.rows_mut(k1, k2).copy_from(g2);
        c[(k1 + k2, 0)] = 1.0;
        g[k1 + k2] = 1.0;
        c[(k1 + k2 + 1, 0)] = -1.0;

        StarSet::new(other.center().clone(), basis, c, g)
    }

    /// Alias of [`StarSet::convex_hull`]: the smallest convex set containing both stars.
    pub fn union(&self, other: &StarSet, solver: &FeasibilitySolver) -> StarResult<StarSet> {
        self.convex_hull(other, solver)
    }

    /// Box star spanning the bounding boxes of every input.
    pub fn combine_stars(stars: &[StarSet], solver: &FeasibilitySolver) -> StarResult<StarSet> {
        let (first, rest) = stars
            .split_first()
            .ok_or(StarError::EmptyInput("combine_stars"))?;
        let mut rect: Rect = first.overapprox_rectangle(solver)?;
        for star in rest {
            rect = rect.hull(&star.overapprox_rectangle(solver)?)?;
        }
        debug!("Combined {} stars into box {} .. {}", stars.len(), rect.mins.transpose(), rect.maxes.transpose());
        StarSet::from_rect(&rect)
    }

    /// Push the center and every `center + generator` through `map`, keeping the predicate.
    fn map_generators<F>(&self, mut map: F) -> StarResult<StarSet>
    where
        F: FnMut(&DVector<f64>) -> StarResult<DVector<f64>>,
    {
        let new_center = map(self.center())?;
        let mut new_basis = DMatrix::zeros(self.num_generators(), new_center.len());
        for (i, generator) in self.basis().row_iter().enumerate() {
            let shifted = self.center() + generator.transpose();
            let image = map(&shifted)?;
            if image.len() != new_center.len() {
                return Err(StarError::DimensionMismatch {
                    context: "mapped generator length",
                    expected: new_center.len(),
                    found: image.len(),
                });
            }
            new_basis.row_mut(i).copy_from(&(image - &new_center).transpose());
        }
        self.superposition(new_center, new_basis)
    }

    /// Propagate the star for time `t` through a point simulator.
    ///
    /// Simulates the center and each `center + generator` and takes the
    /// differences as new generators. This is only an approximation: it is
    /// exact when the flow is affine on the star and can be arbitrarily wrong
    /// otherwise.
    pub fn post_cont<F>(&self, simulate: F, t: f64) -> StarResult<StarSet>
    where
        F: Fn(&DVector<f64>, f64) -> StarResult<DVector<f64>>,
    {
        self.map_generators(|x| simulate(x, t))
    }

    /// Apply a discrete reset with the same generator-difference technique as [`StarSet::post_cont`].
    pub fn apply_reset<F, E, V>(&self, reset: F, expressions: &[E], variables: &[V]) -> StarResult<StarSet>
    where
        F: Fn(&DVector<f64>, &[E], &[V]) -> StarResult<DVector<f64>>,
    {
        self.map_generators(|x| reset(x, expressions, variables))
    }

    /// Write the membership constraints of the star into `system`.
    ///
    /// Allocates one free variable per generator and adds
    /// `center + Bᵗα = state` together with `C·α ≤ g`. Returns the range of the
    /// allocated coefficient variables.
    pub fn encode_membership(&self, system: &mut ConstraintSystem, state: StateRef<'_>) -> StarResult<Range<usize>> {
        let n = self.dimension();
        if state.len() != n {
            return Err(StarError::DimensionMismatch {
                context: "encoded state length",
                expected: n,
                found: state.len(),
            });
        }
        if let StateRef::Variables(vars) = state {
            if let Some(&bad) = vars.iter().find(|&&v| v >= system.num_vars()) {
                return Err(StarError::DimensionMismatch {
                    context: "encoded state variable index",
                    expected: system.num_vars(),
                    found: bad + 1,
                });
            }
        }

        let alpha = system.add_variables(self.num_generators(), VarBound::Free);
        let basis = self.basis();
        for i in 0..n {
            let terms = alpha.clone().map(|a| (a, basis[(a - alpha.start, i)]));
            match state {
                StateRef::Point(p) => system.add_eq(terms, p[i] - self.center()[i]),
                StateRef::Variables(vars) => {
                    system.add_eq(terms.chain([(vars[i], -1.0)]), -self.center()[i])
                }
            }
        }

        let (c, g) = self.predicate();
        for (r, row) in c.row_iter().enumerate() {
            let terms = alpha.clone().map(|a| (a, row[a - alpha.start]));
            system.add_le(terms, g[r]);
        }
        Ok(alpha)
    }
}
