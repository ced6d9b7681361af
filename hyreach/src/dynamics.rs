//! Capability interfaces for the continuous and discrete dynamics of an agent.
use std::fmt;

use hystar::prelude::{StarError, StarSet};
use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    magic::TIME_ALIGNMENT_TOLERANCE,
    utils::error::{ReachError, ReachResult},
};

/// Discrete mode of a hybrid agent, e.g. `["Normal", "T1"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ModeLabel(SmallVec<String, 2>);

impl ModeLabel {
    pub fn new<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for ModeLabel {
    fn from(parts: Vec<String>) -> Self {
        Self(parts.into_iter().collect())
    }
}

impl From<ModeLabel> for Vec<String> {
    fn from(label: ModeLabel) -> Self {
        label.0.into_iter().collect()
    }
}

impl From<&str> for ModeLabel {
    fn from(part: &str) -> Self {
        Self::new([part])
    }
}

impl fmt::Display for ModeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Ordered `(time, state)` samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<DVector<f64>>,
}

impl Trajectory {
    pub fn new(times: Vec<f64>, states: Vec<DVector<f64>>) -> ReachResult<Self> {
        if times.len() != states.len() {
            return Err(ReachError::TrajectoryMismatch {
                expected: times.len(),
                found: states.len(),
            });
        }
        Ok(Self { times, states })
    }

    /// Build from rows laid out as `[time, x₁, …, xₙ]`.
    pub fn from_rows(rows: &[Vec<f64>]) -> ReachResult<Self> {
        let width = rows.first().map_or(1, Vec::len);
        let mut times = Vec::with_capacity(rows.len());
        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let Some((&t, state)) = row.split_first().filter(|_| row.len() == width) else {
                return Err(StarError::DimensionMismatch {
                    context: "trajectory row width",
                    expected: width,
                    found: row.len(),
                }
                .into());
            };
            times.push(t);
            states.push(DVector::from_column_slice(state));
        }
        Ok(Self { times, states })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &DVector<f64>)> {
        self.times.iter().copied().zip(self.states.iter())
    }

    pub fn last_state(&self) -> Option<&DVector<f64>> {
        self.states.last()
    }

    /// Check that every trajectory of `batch` has the same length and time stamps as the first.
    pub fn check_aligned(batch: &[Trajectory]) -> ReachResult<()> {
        let Some((first, rest)) = batch.split_first() else {
            return Ok(());
        };
        for traj in rest {
            if traj.len() != first.len() {
                return Err(ReachError::TrajectoryMismatch {
                    expected: first.len(),
                    found: traj.len(),
                });
            }
            for (index, (&expected, &found)) in first.times.iter().zip(&traj.times).enumerate() {
                if (expected - found).abs() > TIME_ALIGNMENT_TOLERANCE * expected.abs().max(1.0) {
                    return Err(ReachError::MisalignedTimes {
                        index,
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Continuous dynamics of one agent kind.
pub trait Simulator: Send + Sync {
    /// Simulate from `initial` for `time_bound` with samples every `time_step`.
    ///
    /// The first sample is the initial state at time 0.
    fn simulate(
        &self,
        mode: &ModeLabel,
        initial: &DVector<f64>,
        time_bound: f64,
        time_step: f64,
    ) -> ReachResult<Trajectory>;
}

/// Discrete transition map.
pub trait ResetMap {
    fn reset(&self, point: &DVector<f64>, expressions: &[String], variables: &[String]) -> ReachResult<DVector<f64>>;
}

/// [`Simulator`] backed by a closure.
pub struct FnSimulator<F>(pub F);

impl<F> Simulator for FnSimulator<F>
where
    F: Fn(&ModeLabel, &DVector<f64>, f64, f64) -> ReachResult<Trajectory> + Send + Sync,
{
    fn simulate(&self, mode: &ModeLabel, initial: &DVector<f64>, time_bound: f64, time_step: f64) -> ReachResult<Trajectory> {
        (self.0)(mode, initial, time_bound, time_step)
    }
}

/// [`ResetMap`] backed by a closure.
pub struct FnReset<F>(pub F);

impl<F> ResetMap for FnReset<F>
where
    F: Fn(&DVector<f64>, &[String], &[String]) -> ReachResult<DVector<f64>>,
{
    fn reset(&self, point: &DVector<f64>, expressions: &[String], variables: &[String]) -> ReachResult<DVector<f64>> {
        (self.0)(point, expressions, variables)
    }
}

/// Affine dynamics `ẋ = A·x + b`, integrated with the classic fourth-order Runge-Kutta scheme.
///
/// The mode label is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSimulator {
    a: DMatrix<f64>,
    b: DVector<f64>,
}

impl LinearSimulator {
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> ReachResult<Self> {
        if !a.is_square() || a.nrows() != b.len() {
            return Err(StarError::DimensionMismatch {
                context: "linear dynamics",
                expected: a.nrows(),
                found: if a.is_square() { b.len() } else { a.ncols() },
            }
            .into());
        }
        Ok(Self { a, b })
    }

    pub fn dimension(&self) -> usize {
        self.b.len()
    }

    fn derivative(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.a * x + &self.b
    }

    fn rk4_step(&self, x: &DVector<f64>, h: f64) -> DVector<f64> {
        let k1 = self.derivative(x);
        let k2 = self.derivative(&(x + &k1 * (h / 2.0)));
        let k3 = self.derivative(&(x + &k2 * (h / 2.0)));
        let k4 = self.derivative(&(x + &k3 * h));
        x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0)
    }
}

impl Simulator for LinearSimulator {
    fn simulate(&self, mode: &ModeLabel, initial: &DVector<f64>, time_bound: f64, time_step: f64) -> ReachResult<Trajectory> {
        if !(time_step > 0.0) || !(time_bound >= 0.0) {
            return Err(ReachError::Simulation {
                mode: mode.to_string(),
                reason: format!("invalid horizon {time_bound} with step {time_step}"),
            });
        }
        if initial.len() != self.dimension() {
            return Err(StarError::DimensionMismatch {
                context: "simulated initial state",
                expected: self.dimension(),
                found: initial.len(),
            }
            .into());
        }

        let steps = (time_bound / time_step).round() as usize;
        let mut times = Vec::with_capacity(steps + 1);
        let mut states = Vec::with_capacity(steps + 1);
        let mut x = initial.clone();
        for k in 0..=steps {
            times.push(k as f64 * time_step);
            if k < steps {
                let next = self.rk4_step(&x, time_step);
                states.push(std::mem::replace(&mut x, next));
            } else {
                states.push(x.clone());
            }
        }
        trace!("Simulated {} linear steps in mode {}", steps, mode);
        Trajectory::new(times, states)
    }
}

/// Advance `star` by `t` through `simulator` using generator differences.
///
/// Best-effort: exact only when the flow is affine on the star. A zero
/// duration returns the star unchanged without calling the simulator.
pub fn post_cont(simulator: &dyn Simulator, mode: &ModeLabel, star: &StarSet, t: f64) -> ReachResult<StarSet> {
    if t == 0.0 {
        return Ok(star.clone());
    }
    let step = |x: &DVector<f64>, t: f64| {
        let traj = simulator
            .simulate(mode, x, t, t)
            .map_err(|e| StarError::PointMap(e.to_string()))?;
        traj.last_state()
            .cloned()
            .ok_or_else(|| StarError::PointMap(format!("empty trajectory in mode {mode}")))
    };
    Ok(star.post_cont(step, t)?)
}

/// Apply a discrete reset to `star` using generator differences.
pub fn apply_reset(reset: &dyn ResetMap, star: &StarSet, expressions: &[String], variables: &[String]) -> ReachResult<StarSet> {
    let map = |x: &DVector<f64>, exprs: &[String], vars: &[String]| {
        reset
            .reset(x, exprs, vars)
            .map_err(|e| StarError::PointMap(e.to_string()))
    };
    Ok(star.apply_reset(map, expressions, variables)?)
}

#[cfg(test)]
mod tests {
    use nalgebra::dvector;

    use super::*;

    #[test]
    fn mode_label_displays_joined() {
        let label = ModeLabel::new(["Normal", "T1"]);
        assert_eq!(label.to_string(), "Normal,T1");
        assert_eq!(label.parts().len(), 2);
        let back: Vec<String> = label.clone().into();
        assert_eq!(ModeLabel::from(back), label);
    }

    #[test]
    fn rows_split_time_from_state() {
        let traj = Trajectory::from_rows(&[vec![0.0, 1.0, 2.0], vec![0.5, 1.5, 2.5]]).unwrap();
        assert_eq!(traj.times(), &[0.0, 0.5]);
        assert_eq!(traj.states()[1], dvector![1.5, 2.5]);

        let err = Trajectory::from_rows(&[vec![0.0, 1.0], vec![0.5]]).unwrap_err();
        assert!(err.is_star());
    }

    #[test]
    fn alignment_detects_length_and_time_mismatch() {
        let a = Trajectory::from_rows(&[vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let b = Trajectory::from_rows(&[vec![0.0, 1.0]]).unwrap();
        let c = Trajectory::from_rows(&[vec![0.0, 1.0], vec![1.1, 1.0]]).unwrap();
        assert!(Trajectory::check_aligned(&[a.clone(), a.clone()]).is_ok());
        assert!(Trajectory::check_aligned(&[a.clone(), b]).unwrap_err().is_trajectory_mismatch());
        assert!(Trajectory::check_aligned(&[a, c]).unwrap_err().is_misaligned_times());
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let sim = LinearSimulator::new(DMatrix::from_element(1, 1, -1.0), dvector![0.0]).unwrap();
        let traj = sim.simulate(&"Normal".into(), &dvector![1.0], 1.0, 0.1).unwrap();
        assert_eq!(traj.len(), 11);
        let end = traj.last_state().unwrap()[0];
        assert!((end - (-1.0f64).exp()).abs() < 1e-6);
        assert!((traj.times()[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_step_is_a_simulation_error() {
        let sim = LinearSimulator::new(DMatrix::zeros(1, 1), dvector![1.0]).unwrap();
        let err = sim.simulate(&"M".into(), &dvector![0.0], 1.0, 0.0).unwrap_err();
        assert!(err.is_simulation());
    }

    #[test]
    fn post_cont_through_constant_drift_translates() {
        let sim = LinearSimulator::new(DMatrix::zeros(2, 2), dvector![1.0, 0.0]).unwrap();
        let star = StarSet::rect_to_star(&dvector![0.0, 0.0], &dvector![1.0, 1.0]).unwrap();
        let moved = post_cont(&sim, &"M".into(), &star, 2.0).unwrap();
        assert!((moved.center() - dvector![2.0, 0.0]).amax() < 1e-9);
        assert!((moved.basis() - star.basis()).amax() < 1e-9);
    }

    #[test]
    fn post_cont_for_zero_duration_is_identity() {
        let sim = LinearSimulator::new(DMatrix::identity(2, 2), dvector![1.0, 0.0]).unwrap();
        let star = StarSet::rect_to_star(&dvector![0.0, 0.0], &dvector![1.0, 1.0]).unwrap();
        let same = post_cont(&sim, &"M".into(), &star, 0.0).unwrap();
        assert_eq!(same, star);
    }

    #[test]
    fn reset_errors_become_point_map_failures() {
        let star = StarSet::rect_to_star(&dvector![0.0], &dvector![1.0]).unwrap();
        let failing = FnReset(|_: &DVector<f64>, _: &[String], _: &[String]| -> ReachResult<DVector<f64>> {
            Err(ReachError::MissingComponent("reset target"))
        });
        let err = apply_reset(&failing, &star, &[], &[]).unwrap_err();
        assert!(matches!(err, ReachError::Star(StarError::PointMap(_))));

        let zero = FnReset(|x: &DVector<f64>, _: &[String], _: &[String]| -> ReachResult<DVector<f64>> { Ok(x * 0.0) });
        let out = apply_reset(&zero, &star, &["x := 0".to_string()], &["x".to_string()]).unwrap();
        assert_eq!(out.center(), &dvector![0.0]);
    }
}
