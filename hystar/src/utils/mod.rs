use nalgebra::{DMatrix, DVector};

use crate::utils::error::{StarError, StarResult};

pub mod error;

/// Build a dense matrix from row slices, checking that every row has `ncols` entries.
pub fn matrix_from_rows(
    rows: &[Vec<f64>],
    ncols: usize,
    context: &'static str,
) -> StarResult<DMatrix<f64>> {
    for row in rows {
        if row.len() != ncols {
            return Err(StarError::DimensionMismatch {
                context,
                expected: ncols,
                found: row.len(),
            });
        }
    }

    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

/// Box predicate `[I; -I]·α ≤ [upper; -lower]` over `dim` coefficients.
pub fn box_predicate(lower: &DVector<f64>, upper: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let dim = lower.len();
    let mut c = DMatrix::zeros(2 * dim, dim);
    let mut g = DVector::zeros(2 * dim);
    for i in 0..dim {
        c[(2 * i, i)] = 1.0;
        c[(2 * i + 1, i)] = -1.0;
        g[2 * i] = upper[i];
        g[2 * i + 1] = -lower[i];
    }
    (c, g)
}

/// Vertical concatenation `[top; bottom]` of two matrices sharing a column count.
pub fn vstack(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    debug_assert_eq!(top.ncols(), bottom.ncols());
    let mut out = DMatrix::zeros(top.nrows() + bottom.nrows(), top.ncols());
    out.rows_mut(0, top.nrows()).copy_from(top);
    out.rows_mut(top.nrows(), bottom.nrows()).copy_from(bottom);
    out
}

/// Concatenation of two vectors.
pub fn vconcat(top: &DVector<f64>, bottom: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        top.len() + bottom.len(),
        top.iter().chain(bottom.iter()).copied(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = matrix_from_rows(&rows, 2, "rows").unwrap_err();
        assert!(matches!(
            err,
            StarError::DimensionMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn box_predicate_interleaves_bounds() {
        let (c, g) = box_predicate(&DVector::from_vec(vec![-1.0, 2.0]), &DVector::from_vec(vec![1.0, 5.0]));
        assert_eq!(c.nrows(), 4);
        assert_eq!(c[(0, 0)], 1.0);
        assert_eq!(c[(1, 0)], -1.0);
        assert_eq!(c[(3, 1)], -1.0);
        assert_eq!(g.as_slice(), &[1.0, 1.0, 5.0, -2.0]);
    }

    #[test]
    fn vstack_keeps_row_order() {
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 5.0, 6.0]);
        let s = vstack(&a, &b);
        assert_eq!(s.nrows(), 3);
        assert_eq!(s[(2, 1)], 6.0);
    }
}
