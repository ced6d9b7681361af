//! The star-set representation.
//!
//! A [`StarSet`] stores
//!  - `center ∈ ℝⁿ`,
//!  - `basis`, an `m × n` matrix whose rows are the generators,
//!  - the predicate `(C, g)` with `C ∈ ℝ^{k×m}` and `g ∈ ℝᵏ`,
//!
//! and represents `{ center + αᵗ·basis : C·α ≤ g }`.
//!
//! Stars are immutable: every operation returns a new instance. Emptiness is
//! never cached; it is decided by a solver query whenever asked.
use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::{
    magic::MIN_BASIS_DETERMINANT,
    utils::{
        box_predicate,
        error::{StarError, StarResult},
        matrix_from_rows,
    },
};

pub mod algebra;
pub mod query;

pub use algebra::PredicateBuilder;

/// Axis-aligned box `[mins, maxes]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RectFields")
)]
pub struct Rect {
    pub mins: DVector<f64>,
    pub maxes: DVector<f64>,
}

impl Rect {
    pub fn new(mins: DVector<f64>, maxes: DVector<f64>) -> StarResult<Self> {
        if mins.len() != maxes.len() {
            return Err(StarError::DimensionMismatch {
                context: "rectangle bounds",
                expected: mins.len(),
                found: maxes.len(),
            });
        }
        Ok(Self { mins, maxes })
    }

    pub fn dimension(&self) -> usize {
        self.mins.len()
    }

    pub fn contains(&self, point: &DVector<f64>, tolerance: f64) -> bool {
        point.len() == self.dimension()
            && (0..self.dimension()).all(|i| {
                point[i] >= self.mins[i] - tolerance && point[i] <= self.maxes[i] + tolerance
            })
    }

    /// Smallest box containing both boxes.
    pub fn hull(&self, other: &Rect) -> StarResult<Rect> {
        if other.dimension() != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "rectangle hull",
                expected: self.dimension(),
                found: other.dimension(),
            });
        }
        Ok(Rect {
            mins: self.mins.zip_map(&other.mins, f64::min),
            maxes: self.maxes.zip_map(&other.maxes, f64::max),
        })
    }

    pub fn center(&self) -> DVector<f64> {
        (&self.mins + &self.maxes) * 0.5
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RectFields {
    mins: DVector<f64>,
    maxes: DVector<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<RectFields> for Rect {
    type Error = StarError;

    fn try_from(fields: RectFields) -> StarResult<Self> {
        Rect::new(fields.mins, fields.maxes)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "StarSetFields")
)]
pub struct StarSet {
    center: DVector<f64>,
    basis: DMatrix<f64>,
    c: DMatrix<f64>,
    g: DVector<f64>,
}

/// Unchecked wire form of [`StarSet`]; deserialization goes through [`StarSet::new`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct StarSetFields {
    center: DVector<f64>,
    basis: DMatrix<f64>,
    c: DMatrix<f64>,
    g: DVector<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<StarSetFields> for StarSet {
    type Error = StarError;

    fn try_from(fields: StarSetFields) -> StarResult<Self> {
        StarSet::new(fields.center, fields.basis, fields.c, fields.g)
    }
}

impl StarSet {
    /// Construct a star set, checking every shape invariant.
    pub fn new(
        center: DVector<f64>,
        basis: DMatrix<f64>,
        c: DMatrix<f64>,
        g: DVector<f64>,
    ) -> StarResult<Self> {
        if basis.ncols() != center.len() {
            return Err(StarError::DimensionMismatch {
                context: "basis vector length",
                expected: center.len(),
                found: basis.ncols(),
            });
        }
        if c.ncols() != basis.nrows() {
            return Err(StarError::DimensionMismatch {
                context: "predicate width",
                expected: basis.nrows(),
                found: c.ncols(),
            });
        }
        if g.len() != c.nrows() {
            return Err(StarError::DimensionMismatch {
                context: "predicate bound length",
                expected: c.nrows(),
                found: g.len(),
            });
        }

        Ok(Self { center, basis, c, g })
    }

    /// Construct from row slices; ragged rows are reported as [`StarError::DimensionMismatch`].
    pub fn from_rows(
        center: &[f64],
        basis: &[Vec<f64>],
        c: &[Vec<f64>],
        g: &[f64],
    ) -> StarResult<Self> {
        let basis = matrix_from_rows(basis, center.len(), "basis vector length")?;
        let c = matrix_from_rows(c, basis.nrows(), "predicate width")?;
        Self::new(
            DVector::from_column_slice(center),
            basis,
            c,
            DVector::from_column_slice(g),
        )
    }

    /// Star with zero center, identity basis and the H-polytope `A·x ≤ b` as predicate.
    pub fn from_poly(a: DMatrix<f64>, b: DVector<f64>) -> StarResult<Self> {
        if a.nrows() != b.len() {
            return Err(StarError::DimensionMismatch {
                context: "polytope right-hand side",
                expected: a.nrows(),
                found: b.len(),
            });
        }
        let n = a.ncols();
        Self::new(DVector::zeros(n), DMatrix::identity(n, n), a, b)
    }

    /// Box star spanning `[mins, maxes]`.
    pub fn rect_to_star(mins: &DVector<f64>, maxes: &DVector<f64>) -> StarResult<Self> {
        if mins.len() != maxes.len() {
            return Err(StarError::DimensionMismatch {
                context: "rectangle bounds",
                expected: mins.len(),
                found: maxes.len(),
            });
        }
        let (c, g) = box_predicate(mins, maxes);
        Self::from_poly(c, g)
    }

    pub fn from_rect(rect: &Rect) -> StarResult<Self> {
        Self::rect_to_star(&rect.mins, &rect.maxes)
    }

    /// H-representation `{ x : A·x ≤ b }` of the star.
    ///
    /// With `x = center + Bᵗα` and a square invertible basis, `α = B⁻ᵀ(x − center)`,
    /// so `A = C·B⁻ᵀ` and `b = g + A·center`. Other bases are not supported.
    pub fn to_poly(&self) -> StarResult<(DMatrix<f64>, DVector<f64>)> {
        if !self.basis.is_square() || self.basis.determinant().abs() < MIN_BASIS_DETERMINANT {
            return Err(StarError::Unsupported("to_poly on a non-invertible basis"));
        }
        let inv_t = self
            .basis
            .transpose()
            .try_inverse()
            .ok_or(StarError::Unsupported("to_poly on a non-invertible basis"))?;
        let a = &self.c * inv_t;
        let b = &self.g + &a * &self.center;
        Ok((a, b))
    }

    /// Dimension `n` of the state space.
    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    /// Number `m` of generators.
    pub fn num_generators(&self) -> usize {
        self.basis.nrows()
    }

    /// Number `k` of predicate rows.
    pub fn num_constraints(&self) -> usize {
        self.c.nrows()
    }

    pub fn center(&self) -> &DVector<f64> {
        &self.center
    }

    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    pub fn predicate(&self) -> (&DMatrix<f64>, &DVector<f64>) {
        (&self.c, &self.g)
    }

    pub fn into_parts(self) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>, DVector<f64>) {
        (self.center, self.basis, self.c, self.g)
    }

    /// Same predicate, new center and generators.
    pub fn superposition(&self, new_center: DVector<f64>, new_basis: DMatrix<f64>) -> StarResult<Self> {
        if new_basis.nrows() != self.num_generators() {
            return Err(StarError::DimensionMismatch {
                context: "superposition generator count",
                expected: self.num_generators(),
                found: new_basis.nrows(),
            });
        }
        Self::new(new_center, new_basis, self.c.clone(), self.g.clone())
    }

    /// Same center and generators, predicate bounds scaled by `mu`.
    pub fn scale_predicate(&self, mu: f64) -> Self {
        Self {
            center: self.center.clone(),
            basis: self.basis.clone(),
            c: self.c.clone(),
            g: &self.g * mu,
        }
    }

    /// Projection of the center on two dimensions.
    pub fn center_point(&self, dim1: usize, dim2: usize) -> StarResult<(f64, f64)> {
        let n = self.dimension();
        for d in [dim1, dim2] {
            if d >= n {
                return Err(StarError::DimensionMismatch {
                    context: "projected dimension",
                    expected: n,
                    found: d + 1,
                });
            }
        }
        Ok((self.center[dim1], self.center[dim2]))
    }

    /// Point of the star at generator coefficients `alpha`.
    pub fn point_at(&self, alpha: &DVector<f64>) -> DVector<f64> {
        &self.center + self.basis.tr_mul(alpha)
    }
}

impl fmt::Display for StarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "center: {}", self.center.transpose())?;
        write!(f, "basis:{}", self.basis)?;
        write!(f, "C:{}", self.c)?;
        write!(f, "g: {}", self.g.transpose())
    }
}


#[cfg(test)]
mod tests {
    use super::{fixtures::square, *};
    use nalgebra::dvector;

    #[test]
    fn construction_checks_every_shape() {
        let center = dvector![0.0, 0.0];
        let bad_basis = DMatrix::identity(2, 3);
        assert!(
            StarSet::new(center.clone(), bad_basis, DMatrix::zeros(1, 2), dvector![1.0])
                .unwrap_err()
                .is_dimension_mismatch()
        );

        let basis = DMatrix::identity(2, 2);
        assert!(
            StarSet::new(center.clone(), basis.clone(), DMatrix::zeros(1, 3), dvector![1.0])
                .unwrap_err()
                .is_dimension_mismatch()
        );
        assert!(
            StarSet::new(center, basis, DMatrix::zeros(2, 2), dvector![1.0])
                .unwrap_err()
                .is_dimension_mismatch()
        );
    }

    #[test]
    fn ragged_basis_rows_are_rejected() {
        let err = StarSet::from_rows(
            &[0.0, 0.0],
            &[vec![1.0, 0.0], vec![1.0]],
            &[vec![1.0, 0.0]],
            &[1.0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            StarError::DimensionMismatch {
                context: "basis vector length",
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn superposition_keeps_predicate() {
        let star = square();
        let moved = star
            .superposition(dvector![0.0, 1.0], DMatrix::identity(2, 2) * 2.0)
            .unwrap();
        assert_eq!(moved.predicate(), star.predicate());
        assert_eq!(moved.center(), &dvector![0.0, 1.0]);

        let err = star
            .superposition(dvector![0.0, 1.0], DMatrix::identity(3, 2))
            .unwrap_err();
        assert!(err.is_dimension_mismatch());
    }

    #[test]
    fn to_poly_inverts_the_basis() {
        let star = square();
        let (a, b) = star.to_poly().unwrap();
        let inside = dvector![2.5, 3.5];
        let outside = dvector![4.5, 3.0];
        assert!((&a * &inside - &b).iter().all(|v| *v <= 1e-12));
        assert!((&a * &outside - &b).iter().any(|v| *v > 0.0));
    }

    #[test]
    fn to_poly_rejects_rank_deficient_basis() {
        let star = StarSet::from_rows(
            &[0.0, 0.0],
            &[vec![1.0, 1.0], vec![2.0, 2.0]],
            &[vec![1.0, 0.0]],
            &[1.0],
        )
        .unwrap();
        assert!(star.to_poly().unwrap_err().is_unsupported());
    }

    #[test]
    fn point_at_maps_coefficients() {
        let star = square();
        assert_eq!(star.point_at(&dvector![1.0, -1.0]), dvector![4.0, 2.0]);
    }
}
