//! Learned inflation schedules.
//!
//! A [`BoundEstimator`] maps elapsed time to the scale `mu` applied to the
//! predicate bounds of a reach tube. It is trained once over whole trajectory
//! batches instead of fitting each time step on its own, and is kept apart
//! from [`crate::fitter::StepFitter`] so either refinement can be swapped in.
pub mod mlp;

use hystar::{magic::BASIS_RIDGE, prelude::StarError};
use nalgebra::{DMatrix, DVector};

pub use mlp::MlpEstimator;

use crate::{
    fitter::{StepCloud, pca},
    utils::error::ReachResult,
};

/// Supplies one simulated trajectory batch per training epoch.
pub trait BatchSource {
    fn next_batch(&mut self) -> ReachResult<Vec<StepCloud>>;
}

impl<F> BatchSource for F
where
    F: FnMut() -> ReachResult<Vec<StepCloud>>,
{
    fn next_batch(&mut self) -> ReachResult<Vec<StepCloud>> {
        self()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub epochs: usize,
    /// Loss of every epoch, before its optimizer step.
    pub losses: Vec<f64>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.losses.last().copied()
    }
}

/// Time to inflation scale regression.
///
/// Training is best-effort: neither convergence nor a violation-free schedule
/// is guaranteed.
pub trait BoundEstimator: Send {
    /// Fit the schedule of the predicate `(c, g)` against the clouds of `batches`.
    fn train(&mut self, c: &DMatrix<f64>, g: &DVector<f64>, batches: &mut dyn BatchSource) -> ReachResult<TrainingReport>;

    /// Nonnegative scale at time `t`.
    fn predict(&self, t: f64) -> f64;
}

/// Coordinates of one time step in the predicate space, ready for the violation loss.
#[derive(Debug, Clone)]
pub(crate) struct StepTarget {
    pub time: f64,
    /// `C·(Bᵗ + εI)⁻¹(p − c)` for every point `p` of the cloud.
    pub coords: Vec<DVector<f64>>,
}

impl StepTarget {
    pub fn from_cloud(c: &DMatrix<f64>, cloud: &StepCloud) -> ReachResult<Self> {
        let center = pca::mean(&cloud.points)?;
        let basis = pca::pca_basis(&cloud.points)?;
        if c.ncols() != basis.nrows() {
            return Err(StarError::DimensionMismatch {
                context: "predicate columns against cloud dimension",
                expected: basis.nrows(),
                found: c.ncols(),
            }
            .into());
        }

        let n = basis.nrows();
        let ridged = basis.transpose() + DMatrix::identity(n, n) * BASIS_RIDGE;
        let inverse = ridged.try_inverse().ok_or(StarError::FitFailed {
            points: cloud.points.len(),
            generators: n,
        })?;
        let projected = c * inverse;
        Ok(Self {
            time: cloud.time,
            coords: cloud.points.iter().map(|p| &projected * (p - &center)).collect(),
        })
    }
}
