//! Reach tube construction strategies.
use hystar::prelude::{CancelToken, FeasibilitySolver, StarError, StarSet};
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_chacha::ChaCha20Rng;

use super::{ReachTube, TubeBloater, TubeEntry, bloat::stitch};
use crate::{
    dynamics::{ModeLabel, Simulator, Trajectory},
    estimator::{BatchSource, BoundEstimator, MlpEstimator},
    fitter::{StepCloud, StepFitter, fitter_from_conf, pca, step_clouds},
    sampling::{StarSampler, sampling_rng},
    utils::{
        conf::{ReachConfig, SampleFitMode, StrategyKind},
        error::{ReachError, ReachResult},
    },
};

/// Apply `f` to every item on up to `workers` scoped threads, keeping input order.
fn map_parallel<T, U, F>(items: &[T], workers: usize, f: F) -> ReachResult<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> ReachResult<U> + Sync,
{
    let chunk = items.len().div_ceil(workers.max(1)).max(1);
    let joined = crossbeam::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = items
            .chunks(chunk)
            .enumerate()
            .map(|(c, part)| {
                scope.spawn(move |_| {
                    part.iter()
                        .enumerate()
                        .map(|(i, item)| f(item).map(|u| (c * chunk + i, u)))
                        .collect::<ReachResult<Vec<_>>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    })
    .map_err(|_| ReachError::Worker("worker scope panicked".to_string()))?;

    let mut indexed = Vec::with_capacity(items.len());
    for part in joined {
        let part = part.map_err(|_| ReachError::Worker("worker thread panicked".to_string()))?;
        indexed.extend(part?);
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, u)| u).collect())
}

/// Builds the reach tube of a star under one mode.
///
/// ```
/// use hyreach::prelude::*;
/// use nalgebra::{DMatrix, DVector, dvector};
///
/// let simulator = LinearSimulator::new(DMatrix::zeros(1, 1), DVector::zeros(1)).unwrap();
/// let mut conf = ReachConfig::default();
/// conf.strategy.kind = StrategyKind::Linear;
///
/// let initial = StarSet::rect_to_star(&dvector![0.0], &dvector![1.0]).unwrap();
/// let mut builder = ReachTubeBuilder::new(conf, &simulator).unwrap();
/// let tube = builder.build(&ModeLabel::from("Hold"), &initial, 1.0, 0.5).unwrap();
/// assert_eq!(tube.len(), 3);
/// ```
pub struct ReachTubeBuilder<'a> {
    conf: ReachConfig,
    simulator: &'a dyn Simulator,
    bloater: Option<&'a dyn TubeBloater>,
    fitter: Option<Box<dyn StepFitter>>,
    estimator: Option<Box<dyn BoundEstimator>>,
    cancel: CancelToken,
}

impl<'a> ReachTubeBuilder<'a> {
    pub fn new(conf: ReachConfig, simulator: &'a dyn Simulator) -> ReachResult<Self> {
        conf.validate()?;
        Ok(Self {
            conf,
            simulator,
            bloater: None,
            fitter: None,
            estimator: None,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_bloater(mut self, bloater: &'a dyn TubeBloater) -> Self {
        self.bloater = Some(bloater);
        self
    }

    /// Replace the step fitter selected by the configuration.
    pub fn with_fitter(mut self, fitter: Box<dyn StepFitter>) -> Self {
        self.fitter = Some(fitter);
        self
    }

    /// Replace the default [`MlpEstimator`]. A trained estimator is kept across builds.
    pub fn with_estimator(mut self, estimator: Box<dyn BoundEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Token cancelling the running and every later build once triggered.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ReachConfig {
        &self.conf
    }

    fn solver(&self) -> FeasibilitySolver {
        self.conf.solver.feasibility_solver(self.cancel.clone())
    }

    fn check_cancelled(&self) -> ReachResult<()> {
        if self.cancel.is_cancelled() { Err(ReachError::Cancelled) } else { Ok(()) }
    }

    /// Reach tube of `initial` over `[0, horizon]` sampled every `step`.
    pub fn build(&mut self, mode: &ModeLabel, initial: &StarSet, horizon: f64, step: f64) -> ReachResult<ReachTube> {
        if !(step > 0.0) || !(horizon >= 0.0) {
            return Err(ReachError::InvalidConfig(format!("invalid horizon {horizon} with step {step}")));
        }
        info!(
            "Building {} reach tube in mode {} over [0, {}] with step {}",
            self.conf.strategy.kind, mode, horizon, step
        );

        let result = match self.conf.strategy.kind {
            StrategyKind::Linear => self.calc_reach_tube_linear(mode, initial, horizon, step),
            StrategyKind::Bloating => self.bloating(mode, initial, horizon, step),
            StrategyKind::SampleFit => match self.conf.strategy.mode {
                SampleFitMode::Batch => self.sample_fit_batch(mode, initial, horizon, step),
                SampleFitMode::Iterative => self.sample_fit_iterative(mode, initial, horizon, step),
            },
            StrategyKind::Learned => self.learned(mode, initial, horizon, step),
        };

        match result {
            Err(_) if self.cancel.is_cancelled() => Err(ReachError::Cancelled),
            Ok(tube) => {
                debug!("Reach tube in mode {} has {} entries", mode, tube.len());
                Ok(tube)
            }
            Err(e) => Err(e),
        }
    }

    fn simulate_all(&self, mode: &ModeLabel, points: &[DVector<f64>], horizon: f64, step: f64) -> ReachResult<Vec<Trajectory>> {
        let simulator = self.simulator;
        let cancel = &self.cancel;
        let run = |p: &DVector<f64>| {
            if cancel.is_cancelled() {
                return Err(ReachError::Cancelled);
            }
            simulator.simulate(mode, p, horizon, step)
        };
        if self.conf.strategy.parallel {
            map_parallel(points, self.conf.strategy.worker_count(), run)
        } else {
            points.iter().map(run).collect()
        }
    }

    /// Generator-difference propagation over the full horizon.
    ///
    /// Simulates the center and `center + basisᵢ` for every generator; the star
    /// at each time index keeps the predicate and takes the simulated center
    /// and differences as its center and basis.
    pub fn calc_reach_tube_linear(
        &self,
        mode: &ModeLabel,
        initial: &StarSet,
        horizon: f64,
        step: f64,
    ) -> ReachResult<ReachTube> {
        let center = initial.center();
        let seeds: Vec<DVector<f64>> = std::iter::once(center.clone())
            .chain(initial.basis().row_iter().map(|row| center + row.transpose()))
            .collect();
        let batch = self.simulate_all(mode, &seeds, horizon, step)?;
        Trajectory::check_aligned(&batch)?;

        let (center_traj, generator_trajs) = batch
            .split_first()
            .ok_or(StarError::EmptyInput("linear reach tube seeds"))?;
        let mut tube = ReachTube::new(mode.clone());
        for (k, (time, new_center)) in center_traj.iter().enumerate() {
            let mut basis = DMatrix::zeros(generator_trajs.len(), new_center.len());
            for (i, traj) in generator_trajs.iter().enumerate() {
                basis.row_mut(i).copy_from(&(&traj.states()[k] - new_center).transpose());
            }
            tube.push(time, initial.superposition(new_center.clone(), basis)?)?;
        }
        Ok(tube)
    }

    fn bloating(&self, mode: &ModeLabel, initial: &StarSet, horizon: f64, step: f64) -> ReachResult<ReachTube> {
        let bloater = self.bloater.ok_or(ReachError::MissingComponent("tube bloater"))?;
        let rect = initial.overapprox_rectangle(&self.solver())?;
        let rows = bloater.bloat(mode, &rect, horizon, step, self.simulator)?;
        self.check_cancelled()?;

        let mut tube = ReachTube::new(mode.clone());
        for (time, star) in stitch(&rows, self.conf.bloating.stitch)? {
            tube.push(time, star)?;
        }
        Ok(tube)
    }

    fn sample_fit_batch(&self, mode: &ModeLabel, initial: &StarSet, horizon: f64, step: f64) -> ReachResult<ReachTube> {
        let solver = self.solver();
        let sampler = StarSampler::new(solver.clone(), &self.conf.sampling);
        let mut rng = sampling_rng(self.conf.sampling.seed);
        let points = sampler.sample(initial, self.conf.sampling.samples, &mut rng)?;
        let clouds = step_clouds(&self.simulate_all(mode, &points, horizon, step)?)?;

        let default_fitter;
        let fitter: &dyn StepFitter = match &self.fitter {
            Some(fitter) => fitter.as_ref(),
            None => {
                default_fitter = fitter_from_conf(&self.conf, solver);
                default_fitter.as_ref()
            }
        };
        let cancel = &self.cancel;
        let fit = |cloud: &StepCloud| {
            if cancel.is_cancelled() {
                return Err(ReachError::Cancelled);
            }
            Ok(TubeEntry {
                time: cloud.time,
                star: fitter.fit(initial, &cloud.points)?,
            })
        };

        let entries = if self.conf.strategy.parallel {
            map_parallel(&clouds, self.conf.strategy.worker_count(), fit)?
        } else {
            clouds.iter().map(fit).collect::<ReachResult<Vec<_>>>()?
        };
        ReachTube::from_entries(mode.clone(), entries)
    }

    fn sample_fit_iterative(&self, mode: &ModeLabel, initial: &StarSet, horizon: f64, step: f64) -> ReachResult<ReachTube> {
        let solver = self.solver();
        let sampler = StarSampler::new(solver.clone(), &self.conf.sampling);
        let mut rng = sampling_rng(self.conf.sampling.seed);
        let default_fitter;
        let fitter: &dyn StepFitter = match &self.fitter {
            Some(fitter) => fitter.as_ref(),
            None => {
                default_fitter = fitter_from_conf(&self.conf, solver);
                default_fitter.as_ref()
            }
        };

        let steps = (horizon / step).round() as usize;
        let mut tube = ReachTube::new(mode.clone());
        tube.push(0.0, initial.clone())?;
        let mut current = initial.clone();
        for k in 0..steps {
            self.check_cancelled()?;
            let points = sampler.sample(&current, self.conf.sampling.samples, &mut rng)?;
            let cloud = self
                .simulate_all(mode, &points, step, step)?
                .iter()
                .map(|traj| {
                    traj.last_state()
                        .cloned()
                        .ok_or_else(|| ReachError::Simulation {
                            mode: mode.to_string(),
                            reason: "empty trajectory".to_string(),
                        })
                })
                .collect::<ReachResult<Vec<_>>>()?;
            current = fitter.fit(&current, &cloud)?;
            tube.push((k + 1) as f64 * step, current.clone())?;
        }
        Ok(tube)
    }

    fn learned(&mut self, mode: &ModeLabel, initial: &StarSet, horizon: f64, step: f64) -> ReachResult<ReachTube> {
        let sampler = StarSampler::new(self.solver(), &self.conf.sampling);
        let mut rng = sampling_rng(self.conf.sampling.seed);
        let est_conf = &self.conf.estimator;
        let pool = sampler.sample(initial, est_conf.pool_factor * est_conf.batch_size, &mut rng)?;
        let (c, g) = initial.predicate();

        let mut estimator = self
            .estimator
            .take()
            .unwrap_or_else(|| -> Box<dyn BoundEstimator> {
                Box::new(MlpEstimator::from_conf(est_conf, self.conf.sampling.seed))
            });
        let trained = {
            let mut batches = PoolBatches {
                builder: &*self,
                mode,
                pool: &pool,
                batch_size: est_conf.batch_size,
                horizon,
                step,
                rng: &mut rng,
            };
            estimator.train(c, g, &mut batches)
        };
        let result = trained.and_then(|report| {
            info!("Bound estimator trained for {} epochs, final loss {:?}", report.epochs, report.final_loss());
            let eval = sampler.sample(initial, self.conf.estimator.eval_samples, &mut rng)?;
            self.scaled_tube(mode, initial, &eval, horizon, step, estimator.as_ref())
        });
        self.estimator = Some(estimator);
        result
    }

    /// Stars centered on the mean of each simulated cloud, spanned by its PCA
    /// basis and scaled by the estimator's prediction at that time.
    fn scaled_tube(
        &self,
        mode: &ModeLabel,
        initial: &StarSet,
        points: &[DVector<f64>],
        horizon: f64,
        step: f64,
        estimator: &dyn BoundEstimator,
    ) -> ReachResult<ReachTube> {
        let (c, g) = initial.predicate();
        let mut tube = ReachTube::new(mode.clone());
        for cloud in step_clouds(&self.simulate_all(mode, points, horizon, step)?)? {
            self.check_cancelled()?;
            let mu = estimator.predict(cloud.time);
            let star = StarSet::new(
                pca::mean(&cloud.points)?,
                pca::pca_basis(&cloud.points)?,
                c.clone(),
                g * mu,
            )?;
            tube.push(cloud.time, star)?;
        }
        Ok(tube)
    }
}

/// Batches simulated from initial states drawn with replacement from a fixed pool.
struct PoolBatches<'b, 'a> {
    builder: &'b ReachTubeBuilder<'a>,
    mode: &'b ModeLabel,
    pool: &'b [DVector<f64>],
    batch_size: usize,
    horizon: f64,
    step: f64,
    rng: &'b mut ChaCha20Rng,
}

impl BatchSource for PoolBatches<'_, '_> {
    fn next_batch(&mut self) -> ReachResult<Vec<StepCloud>> {
        self.builder.check_cancelled()?;
        let picks: Vec<DVector<f64>> = (0..self.batch_size)
            .map(|_| self.pool[self.rng.random_range(0..self.pool.len())].clone())
            .collect();
        step_clouds(&self.builder.simulate_all(self.mode, &picks, self.horizon, self.step)?)
    }
}
