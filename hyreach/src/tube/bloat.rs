//! Rectangle tubes from trajectory bloating and their conversion to stars.
//!
//! A [`TubeBloater`] returns rows in the layout of DryVR rectangle tubes:
//! `(t_k, lower_k)` followed by `(t_{k+1}, upper_k)` for every interval. How
//! those rows are paired back into boxes is chosen by a [`StitchRule`].
use hystar::prelude::{Rect, StarError, StarSet};
use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumString};

use crate::{
    dynamics::{ModeLabel, Simulator, Trajectory},
    magic::{MAX_CORNER_DIMENSION, TIME_ALIGNMENT_TOLERANCE},
    utils::error::ReachResult,
};

/// One `(time, bound)` row of a rectangle tube.
pub type TubeRow = (f64, DVector<f64>);

/// How rectangle tube rows are turned into timed boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIs)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StitchRule {
    /// Rows `2k` and `2k + 1` bound one interval, stamped with the time of row `2k`.
    /// A trailing unpaired row is dropped.
    #[default]
    IntervalPairs,
    /// Consecutive rows sharing a time stamp are merged into their spanning
    /// box, a row with a time stamp of its own becomes a degenerate box, and
    /// the last group is dropped.
    SharedTimestamp,
}

/// Trajectory bloating routine producing a rectangle tube.
pub trait TubeBloater: Send + Sync {
    fn bloat(
        &self,
        mode: &ModeLabel,
        initial: &Rect,
        horizon: f64,
        step: f64,
        simulator: &dyn Simulator,
    ) -> ReachResult<Vec<TubeRow>>;
}

fn spanning(a: &DVector<f64>, b: &DVector<f64>) -> ReachResult<Rect> {
    if a.len() != b.len() {
        return Err(StarError::DimensionMismatch {
            context: "rectangle tube row width",
            expected: a.len(),
            found: b.len(),
        }
        .into());
    }
    Ok(Rect::new(a.zip_map(b, f64::min), a.zip_map(b, f64::max))?)
}

fn same_time(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_ALIGNMENT_TOLERANCE * a.abs().max(1.0)
}

/// Convert rectangle tube rows into timed stars.
pub fn stitch(rows: &[TubeRow], rule: StitchRule) -> ReachResult<Vec<(f64, StarSet)>> {
    let boxes = match rule {
        StitchRule::IntervalPairs => {
            if rows.len() % 2 == 1 {
                warn!("Dropping unpaired rectangle tube row at t = {}", rows[rows.len() - 1].0);
            }
            rows.chunks_exact(2)
                .map(|pair| Ok((pair[0].0, spanning(&pair[0].1, &pair[1].1)?)))
                .collect::<ReachResult<Vec<_>>>()?
        }
        StitchRule::SharedTimestamp => {
            let mut boxes = Vec::new();
            let mut rest = rows;
            while let Some(((time, first), tail)) = rest.split_first() {
                let shared = tail.iter().take_while(|(t, _)| same_time(*t, *time)).count();
                let mut rect = spanning(first, first)?;
                for (_, row) in &tail[..shared] {
                    rect = rect.hull(&spanning(row, row)?)?;
                }
                boxes.push((*time, rect));
                rest = &tail[shared..];
            }
            if let Some((time, _)) = boxes.pop() {
                debug!("Dropping the last rectangle tube group at t = {}", time);
            }
            boxes
        }
    };

    boxes
        .into_iter()
        .map(|(time, rect)| Ok((time, StarSet::from_rect(&rect)?)))
        .collect()
}

/// Heuristic bloater simulating the center and the corners of the initial box.
///
/// Each interval spans every simulated state at both of its end points and
/// is enlarged by `margin` times its width on either side. Beyond
/// [`MAX_CORNER_DIMENSION`] dimensions the face centers replace the corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerBloater {
    pub margin: f64,
}

impl CornerBloater {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }

    fn seeds(rect: &Rect) -> Vec<DVector<f64>> {
        let n = rect.dimension();
        let mut seeds = vec![rect.center()];
        if n <= MAX_CORNER_DIMENSION {
            seeds.extend((0..1usize << n).map(|mask| {
                DVector::from_fn(n, |i, _| if (mask >> i) & 1 == 1 { rect.maxes[i] } else { rect.mins[i] })
            }));
        } else {
            for i in 0..n {
                for bound in [rect.mins[i], rect.maxes[i]] {
                    let mut face = rect.center();
                    face[i] = bound;
                    seeds.push(face);
                }
            }
        }
        seeds
    }
}

impl TubeBloater for CornerBloater {
    fn bloat(
        &self,
        mode: &ModeLabel,
        initial: &Rect,
        horizon: f64,
        step: f64,
        simulator: &dyn Simulator,
    ) -> ReachResult<Vec<TubeRow>> {
        let batch = Self::seeds(initial)
            .iter()
            .map(|seed| simulator.simulate(mode, seed, horizon, step))
            .collect::<ReachResult<Vec<_>>>()?;
        Trajectory::check_aligned(&batch)?;

        let times = batch[0].times();
        let mut rows = Vec::with_capacity(2 * times.len().saturating_sub(1));
        for k in 1..times.len() {
            let mut lo = batch[0].states()[k - 1].clone();
            let mut hi = lo.clone();
            for traj in &batch {
                for state in &traj.states()[k - 1..=k] {
                    lo = lo.zip_map(state, f64::min);
                    hi = hi.zip_map(state, f64::max);
                }
            }
            let pad = (&hi - &lo) * self.margin;
            rows.push((times[k - 1], lo - &pad));
            rows.push((times[k], hi + pad));
        }
        debug!("Corner bloater simulated {} seeds over {} intervals", batch.len(), rows.len() / 2);
        Ok(rows)
    }
}
