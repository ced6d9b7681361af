//! Rejection sampling of star sets.
use hystar::prelude::{ContainmentSolver, FeasibilitySolver, Rect, StarSet};
use log::{debug, warn};
use nalgebra::DVector;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::utils::{
    conf::SamplingConf,
    error::{ReachError, ReachResult},
};

/// Generator seeded from `seed`, or from the thread generator when unseeded.
pub fn sampling_rng(seed: Option<u64>) -> ChaCha20Rng {
    match seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_rng(&mut rand::rng()),
    }
}

/// Uniform point of `rect`. Degenerate dimensions take their single value.
pub fn sample_rect<R: Rng>(rect: &Rect, rng: &mut R) -> DVector<f64> {
    DVector::from_fn(rect.dimension(), |i, _| {
        let (lo, hi) = (rect.mins[i], rect.maxes[i]);
        if hi > lo { rng.random_range(lo..=hi) } else { lo }
    })
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Uniform rejection sampler over the bounding box of a star.
#[derive(Debug, Clone)]
pub struct StarSampler {
    containment: ContainmentSolver,
    miss_tolerance: f64,
    round_decimals: Option<u32>,
}

impl StarSampler {
    pub fn new(solver: FeasibilitySolver, conf: &SamplingConf) -> Self {
        Self {
            containment: ContainmentSolver::new(solver),
            miss_tolerance: conf.miss_tolerance,
            round_decimals: conf.round_decimals,
        }
    }

    pub fn solver(&self) -> &FeasibilitySolver {
        self.containment.solver()
    }

    fn rounded(&self, star: &StarSet) -> ReachResult<StarSet> {
        let Some(decimals) = self.round_decimals else {
            return Ok(star.clone());
        };
        let (c, g) = star.predicate();
        let round = |v: f64| round_to(v, decimals);
        Ok(StarSet::new(
            star.center().map(round),
            star.basis().map(round),
            c.map(round),
            g.map(round),
        )?)
    }

    /// Draw `count` points of `star`.
    ///
    /// Candidates are drawn uniformly from the bounding box and kept only if the
    /// star contains them. More than `floor(count · miss_tolerance)` consecutive
    /// misses abort with [`ReachError::SamplingExhausted`].
    pub fn sample<R: Rng>(&self, star: &StarSet, count: usize, rng: &mut R) -> ReachResult<Vec<DVector<f64>>> {
        let star = self.rounded(star)?;
        let rect = star.overapprox_rectangle(self.solver())?;
        let max_misses = (count as f64 * self.miss_tolerance).floor() as usize;

        let mut points = Vec::with_capacity(count);
        let mut misses = 0usize;
        while points.len() < count {
            let candidate = sample_rect(&rect, rng);
            if self.containment.contains(&star, &candidate)? {
                points.push(candidate);
                misses = 0;
                continue;
            }

            misses += 1;
            if misses > max_misses {
                warn!(
                    "Rejection sampling gave up after {} consecutive misses over box {} .. {}",
                    misses,
                    rect.mins.transpose(),
                    rect.maxes.transpose()
                );
                return Err(ReachError::SamplingExhausted {
                    accepted: points.len(),
                    requested: count,
                    misses,
                });
            }
        }

        debug!("Sampled {} points from a star with {} generators", count, star.num_generators());
        Ok(points)
    }
}
