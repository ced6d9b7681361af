//! Sub-gradient descent on the inflation scale.
use hystar::{
    magic::MIN_BASIS_DETERMINANT,
    prelude::{StarError, StarSet},
};
use log::debug;
use nalgebra::{DMatrix, DVector};

use super::{StepFitter, pca};
use crate::utils::{conf::GradientConf, error::ReachResult};

/// Fits `mu` by descending `mu + Σ_p ‖relu(C·B⁻ᵀ(p − x̄) − mu·g)‖_∞`.
///
/// The center is the sample mean and the basis the PCA basis of the cloud.
/// Unlike [`super::InflationFitter`] the result is not guaranteed to enclose
/// every point.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientFitter {
    pub iterations: usize,
    pub learning_rate: f64,
    pub initial_mu: f64,
}

impl Default for GradientFitter {
    fn default() -> Self {
        Self::from_conf(&GradientConf::default())
    }
}

impl GradientFitter {
    pub fn from_conf(conf: &GradientConf) -> Self {
        Self {
            iterations: conf.iterations,
            learning_rate: conf.learning_rate,
            initial_mu: conf.initial_mu,
        }
    }

    /// Scale of the predicate `(c, g)` over `basis` around `points` centered at `center`.
    pub fn scale(
        &self,
        c: &DMatrix<f64>,
        g: &DVector<f64>,
        basis: &DMatrix<f64>,
        center: &DVector<f64>,
        points: &[DVector<f64>],
    ) -> ReachResult<f64> {
        let invertible = basis.is_square() && basis.determinant().abs() >= MIN_BASIS_DETERMINANT;
        let inv_t = invertible
            .then(|| basis.transpose().try_inverse())
            .flatten()
            .ok_or(StarError::FitFailed {
                points: points.len(),
                generators: basis.nrows(),
            })?;
        let projected = c * inv_t;
        let coords: Vec<DVector<f64>> = points.iter().map(|p| &projected * (p - center)).collect();

        let mut mu = self.initial_mu;
        for _ in 0..self.iterations {
            let mut grad = 1.0;
            for v in &coords {
                let worst = (0..v.len())
                    .map(|r| (r, v[r] - mu * g[r]))
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((r, _)) = worst.filter(|&(_, excess)| excess > 0.0) {
                    grad -= g[r];
                }
            }
            mu -= self.learning_rate * grad;
        }
        Ok(mu.max(0.0))
    }
}

impl StepFitter for GradientFitter {
    fn fit(&self, reference: &StarSet, points: &[DVector<f64>]) -> ReachResult<StarSet> {
        let basis = pca::pca_basis(points)?;
        let center = pca::mean(points)?;
        let (c, g) = reference.predicate();
        let mu = self.scale(c, g, &basis, &center, points)?;
        debug!("Gradient fit over {} points settled at mu = {}", points.len(), mu);
        Ok(StarSet::new(center, basis, c.clone(), g * mu)?)
    }
}
