//! Hyreach: reach tubes over star sets.
//!
//! A reach tube is the time-ordered sequence of stars overapproximating every
//! state an agent can reach from an uncertain initial star. Tubes are built by
//! [`tube::ReachTubeBuilder`] with one of four strategies chosen in
//! [`utils::conf::ReachConfig`]:
//!
//! - *linear*: generator-difference propagation through the simulator;
//! - *bloating*: a rectangle tube from a [`tube::TubeBloater`] re-wrapped into stars;
//! - *sample-fit*: rejection sampling, simulation and a per-step [`fitter::StepFitter`];
//! - *learned*: the same clouds scaled by a trained [`estimator::BoundEstimator`].
//!
//! Dynamics are supplied through the [`dynamics::Simulator`] and
//! [`dynamics::ResetMap`] capabilities.

pub mod dynamics;
pub mod estimator;
pub mod fitter;
/// Defaults and numeric constants.
pub mod magic;
/// Rejection sampling of star sets.
pub mod sampling;
pub mod tube;
pub mod utils;

pub mod prelude {
    //! Convenient re-exports for end users.
    pub use crate::dynamics::{
        FnReset, FnSimulator, LinearSimulator, ModeLabel, ResetMap, Simulator, Trajectory, apply_reset,
        post_cont,
    };
    pub use crate::estimator::{BatchSource, BoundEstimator, MlpEstimator, TrainingReport};
    pub use crate::fitter::{GradientFitter, InflationFitter, StepCloud, StepFitter};
    pub use crate::sampling::StarSampler;
    pub use crate::tube::{CornerBloater, ReachTube, ReachTubeBuilder, StitchRule, TubeBloater, TubeEntry};
    pub use crate::utils::conf::{FitterKind, ReachConfig, SampleFitMode, StrategyKind};
    pub use crate::utils::error::{ReachError, ReachResult};
    pub use hystar::prelude::*;
}
