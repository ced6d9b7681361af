use hystar::prelude::StarError;
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::utils::error::ReachResult;

/// Arithmetic mean of a point cloud.
pub fn mean(points: &[DVector<f64>]) -> ReachResult<DVector<f64>> {
    let first = points.first().ok_or(StarError::EmptyInput("point cloud mean"))?;
    let mut sum = DVector::zeros(first.len());
    for p in points {
        if p.len() != first.len() {
            return Err(StarError::DimensionMismatch {
                context: "point cloud dimension",
                expected: first.len(),
                found: p.len(),
            }
            .into());
        }
        sum += p;
    }
    Ok(sum / points.len() as f64)
}

/// Principal-component basis of a point cloud, one generator per row.
///
/// Rows are the eigenvectors of the sample covariance (denominator `N − 1`),
/// ordered by decreasing variance and scaled by the square root of that
/// variance. Each row is signed so that its largest entry in magnitude is
/// positive.
pub fn pca_basis(points: &[DVector<f64>]) -> ReachResult<DMatrix<f64>> {
    if points.len() < 2 {
        return Err(StarError::EmptyInput("principal components of fewer than two points").into());
    }
    let center = mean(points)?;
    let n = center.len();

    let mut cov = DMatrix::zeros(n, n);
    for p in points {
        let d = p - &center;
        cov += &d * d.transpose();
    }
    cov /= (points.len() - 1) as f64;

    let eigen = SymmetricEigen::new(cov);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut basis = DMatrix::zeros(n, n);
    for (row, &k) in order.iter().enumerate() {
        let scale = eigen.eigenvalues[k].max(0.0).sqrt();
        let mut component = eigen.eigenvectors.column(k).into_owned();
        let pivot = component.iamax();
        if component[pivot] < 0.0 {
            component.neg_mut();
        }
        basis.row_mut(row).copy_from(&(component * scale).transpose());
    }
    Ok(basis)
}
