//! Per-time-step star fitting over simulated point clouds.
pub mod gradient;
pub mod pca;

use hystar::prelude::{ContainmentSolver, FeasibilitySolver, StarError, StarSet};
use log::trace;
use nalgebra::DVector;

pub use gradient::GradientFitter;

use crate::{
    dynamics::Trajectory,
    utils::{
        conf::{FitterKind, ReachConfig},
        error::ReachResult,
    },
};

/// States of a trajectory batch at one time index.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCloud {
    pub time: f64,
    pub points: Vec<DVector<f64>>,
}

/// Transpose an aligned batch of trajectories into one cloud per time index.
pub fn step_clouds(batch: &[Trajectory]) -> ReachResult<Vec<StepCloud>> {
    let first = batch.first().ok_or(StarError::EmptyInput("trajectory batch"))?;
    Trajectory::check_aligned(batch)?;
    Ok(first
        .times()
        .iter()
        .enumerate()
        .map(|(k, &time)| StepCloud {
            time,
            points: batch.iter().map(|traj| traj.states()[k].clone()).collect(),
        })
        .collect())
}

/// Fits one star around the points of a single time step.
pub trait StepFitter: Send + Sync {
    /// Fit a star around `points`, reusing the predicate shape of `reference`.
    fn fit(&self, reference: &StarSet, points: &[DVector<f64>]) -> ReachResult<StarSet>;
}

/// PCA basis followed by the LP inflation fit.
#[derive(Debug, Clone, Default)]
pub struct InflationFitter {
    containment: ContainmentSolver,
}

impl InflationFitter {
    pub fn new(solver: FeasibilitySolver) -> Self {
        Self {
            containment: ContainmentSolver::new(solver),
        }
    }
}

impl StepFitter for InflationFitter {
    fn fit(&self, reference: &StarSet, points: &[DVector<f64>]) -> ReachResult<StarSet> {
        let basis = pca::pca_basis(points)?;
        let fit = self.containment.inflate(reference, &basis, points)?;
        trace!("Inflation fit over {} points gave mu = {} (fallback: {})", points.len(), fit.mu, fit.used_fallback);
        Ok(fit.star)
    }
}

/// Step fitter selected by `conf.strategy.fitter`.
pub fn fitter_from_conf(conf: &ReachConfig, solver: FeasibilitySolver) -> Box<dyn StepFitter> {
    match conf.strategy.fitter {
        FitterKind::Inflation => Box::new(InflationFitter::new(solver)),
        FitterKind::Gradient => Box::new(GradientFitter::from_conf(&conf.gradient)),
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::dvector;

    use super::*;
    use crate::utils::error::ReachError;

    fn traj(offset: f64) -> Trajectory {
        Trajectory::new(vec![0.0, 0.5, 1.0], vec![dvector![offset], dvector![offset + 1.0], dvector![offset + 2.0]]).unwrap()
    }

    #[test]
    fn clouds_follow_time_indices() {
        let clouds = step_clouds(&[traj(0.0), traj(10.0)]).unwrap();
        assert_eq!(clouds.len(), 3);
        assert_eq!(clouds[1].time, 0.5);
        assert_eq!(clouds[1].points, vec![dvector![1.0], dvector![11.0]]);
    }

    #[test]
    fn clouds_reject_ragged_batches() {
        assert!(step_clouds(&[]).unwrap_err().is_star());
        let short = Trajectory::new(vec![0.0], vec![dvector![0.0]]).unwrap();
        assert!(matches!(
            step_clouds(&[traj(0.0), short]),
            Err(ReachError::TrajectoryMismatch { expected: 3, found: 1 })
        ));
    }

    #[test]
    fn inflation_fitter_encloses_the_cloud() {
        let solver = FeasibilitySolver::default();
        let reference = StarSet::rect_to_star(&dvector![-1.0, -1.0], &dvector![1.0, 1.0]).unwrap();
        let points = vec![
            dvector![0.0, 0.0],
            dvector![3.0, 1.0],
            dvector![1.0, 2.0],
            dvector![2.0, -1.0],
            dvector![-1.0, 0.5],
        ];
        let star = InflationFitter::new(solver.clone()).fit(&reference, &points).unwrap();
        for p in &points {
            assert!(star.contains_point(&solver, p).unwrap());
        }
        let conf = ReachConfig::default();
        let boxed = fitter_from_conf(&conf, solver.clone());
        assert_eq!(boxed.fit(&reference, &points).unwrap(), star);
    }
}
