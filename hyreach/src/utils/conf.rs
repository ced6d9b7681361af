//! Reachability configuration, loaded from and saved to TOML.
//!
//! ```toml
//! [solver]
//! timeout-ms = 5000
//!
//! [sampling]
//! samples = 50
//! seed = 42
//!
//! [strategy]
//! kind = "sample-fit"
//! mode = "iterative"
//! ```
//!
//! Every section and field is optional; missing entries take their defaults.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use hystar::prelude::{CancelToken, DenseSimplex, FeasibilitySolver, SolveBudget};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs, EnumString};

use crate::{
    magic::*,
    tube::bloat::StitchRule,
    utils::error::{ReachError, ReachResult},
};

/// Limits and tolerances applied to every LP solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SolverConf {
    /// Per-solve timeout. A timed out solve is fatal.
    pub timeout_ms: Option<u64>,
    pub max_iterations: usize,
    pub pivot_tolerance: f64,
}

impl Default for SolverConf {
    fn default() -> Self {
        let simplex = DenseSimplex::default();
        Self {
            timeout_ms: None,
            max_iterations: SolveBudget::default().max_iterations,
            pivot_tolerance: simplex.pivot_tolerance,
        }
    }
}

impl SolverConf {
    pub fn budget(&self, cancel: CancelToken) -> SolveBudget {
        SolveBudget {
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_iterations: self.max_iterations,
            cancel,
        }
    }

    /// Solver over the default simplex backend honouring this configuration.
    pub fn feasibility_solver(&self, cancel: CancelToken) -> FeasibilitySolver {
        FeasibilitySolver::new(
            Arc::new(DenseSimplex::with_tolerance(self.pivot_tolerance)),
            self.budget(cancel),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SamplingConf {
    pub samples: usize,
    /// Consecutive misses beyond `floor(samples · miss_tolerance)` abort sampling.
    pub miss_tolerance: f64,
    /// Seed of the sampling generator. Unseeded runs draw from the thread generator.
    pub seed: Option<u64>,
    /// Round the star to this many decimals before sampling.
    pub round_decimals: Option<u32>,
}

impl Default for SamplingConf {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLE_COUNT,
            miss_tolerance: DEFAULT_MISS_TOLERANCE,
            seed: None,
            round_decimals: Some(DEFAULT_SAMPLING_DECIMALS),
        }
    }
}

/// Reach-tube propagation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIs)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StrategyKind {
    /// Generator-difference propagation over the full horizon.
    Linear,
    /// Box of the initial star handed to a tube bloater.
    Bloating,
    /// Sample, simulate and fit one star per time index.
    #[default]
    SampleFit,
    /// Sample, simulate and scale with a trained bound estimator.
    Learned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIs)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SampleFitMode {
    /// Sample once and simulate the whole horizon.
    #[default]
    Batch,
    /// Re-sample the previous star and simulate one step at a time.
    Iterative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIs)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FitterKind {
    #[default]
    Inflation,
    Gradient,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StrategyConf {
    pub kind: StrategyKind,
    pub mode: SampleFitMode,
    pub fitter: FitterKind,
    /// Simulate samples and fit time indices on worker threads.
    pub parallel: bool,
    /// Number of worker threads; defaults to the available parallelism.
    pub workers: Option<usize>,
}

impl StrategyConf {
    pub fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }
}

/// Hyperparameters of the learned bound estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EstimatorConf {
    pub hidden: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub pool_factor: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub lr_decay: f64,
    pub violation_weight: f64,
    pub eval_samples: usize,
}

impl Default for EstimatorConf {
    fn default() -> Self {
        Self {
            hidden: DEFAULT_HIDDEN_WIDTH,
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            pool_factor: DEFAULT_POOL_FACTOR,
            learning_rate: DEFAULT_LEARNING_RATE,
            weight_decay: DEFAULT_WEIGHT_DECAY,
            lr_decay: DEFAULT_LR_DECAY,
            violation_weight: DEFAULT_VIOLATION_WEIGHT,
            eval_samples: DEFAULT_EVAL_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GradientConf {
    pub iterations: usize,
    pub learning_rate: f64,
    pub initial_mu: f64,
}

impl Default for GradientConf {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_GRADIENT_ITERATIONS,
            learning_rate: DEFAULT_GRADIENT_LEARNING_RATE,
            initial_mu: DEFAULT_GRADIENT_INITIAL_MU,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BloatingConf {
    pub stitch: StitchRule,
    /// Relative margin used by the corner bloater.
    pub margin: f64,
}

impl Default for BloatingConf {
    fn default() -> Self {
        Self {
            stitch: StitchRule::default(),
            margin: DEFAULT_BLOAT_MARGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachConfig {
    pub solver: SolverConf,
    pub sampling: SamplingConf,
    pub strategy: StrategyConf,
    pub estimator: EstimatorConf,
    pub gradient: GradientConf,
    pub bloating: BloatingConf,
}

impl ReachConfig {
    /// Get the default path to the reachability configuration file.
    pub fn default_path() -> PathBuf {
        if let Ok(config_path) = std::env::var(ENV_REACH_CONFIG_PATH) {
            return config_path.into();
        }

        let mut path = PathBuf::new();

        #[cfg(target_os = "windows")]
        {
            if let Ok(appdata) = std::env::var("APPDATA") {
                path.push(appdata);
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
                path.push(xdg_config_home);
            } else if let Ok(home) = std::env::var("HOME") {
                path.push(home);
                path.push(".config");
            }
        }

        path.push("hyreach");
        path.push("reach.toml");
        path
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(toml_str: &str) -> ReachResult<Self> {
        Self::parse(toml_str, "<inline>")
    }

    /// Load and validate a configuration from a TOML file.
    pub fn load_from_toml(path: &Path) -> ReachResult<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        Self::parse(&toml_str, &path.display().to_string())
    }

    fn parse(toml_str: &str, file: &str) -> ReachResult<Self> {
        let conf: Self = toml::from_str(toml_str).map_err(|e| ReachError::ConfigParse {
            source: e,
            file: file.to_string(),
        })?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn to_toml_string(&self) -> ReachResult<String> {
        toml::to_string(self).map_err(|e| ReachError::ConfigSerialize(e.to_string()))
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save_to_toml(&self, path: &Path) -> ReachResult<()> {
        let toml_str = self.to_toml_string().map_err(|e| {
            ReachError::ConfigSerialize(format!(
                "Failed during serialization of TOML to path `{}`: {}",
                path.display(),
                e
            ))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Reject values no strategy can run with.
    pub fn validate(&self) -> ReachResult<()> {
        let invalid = |msg: &str| Err(ReachError::InvalidConfig(msg.to_string()));

        if self.solver.max_iterations == 0 {
            return invalid("solver.max-iterations must be positive");
        }
        if !(self.solver.pivot_tolerance > 0.0) {
            return invalid("solver.pivot-tolerance must be positive");
        }
        if self.sampling.samples < 2 {
            return invalid("sampling.samples must be at least 2 to derive a basis");
        }
        if !(self.sampling.miss_tolerance >= 0.0) {
            return invalid("sampling.miss-tolerance must be nonnegative");
        }
        if self.strategy.workers == Some(0) {
            return invalid("strategy.workers must be positive");
        }
        let est = &self.estimator;
        if est.hidden == 0 || est.batch_size < 2 || est.pool_factor == 0 || est.eval_samples < 2 {
            return invalid("estimator sizes must be positive (batch and evaluation sizes at least 2)");
        }
        if !(est.learning_rate > 0.0) || !(est.lr_decay > 0.0 && est.lr_decay <= 1.0) {
            return invalid("estimator.learning-rate must be positive and estimator.lr-decay in (0, 1]");
        }
        if !(est.weight_decay >= 0.0) || !(est.violation_weight >= 0.0) {
            return invalid("estimator.weight-decay and estimator.violation-weight must be nonnegative");
        }
        if !(self.gradient.learning_rate > 0.0) {
            return invalid("gradient.learning-rate must be positive");
        }
        if !(self.bloating.margin >= 0.0) {
            return invalid("bloating.margin must be nonnegative");
        }
        Ok(())
    }
}
