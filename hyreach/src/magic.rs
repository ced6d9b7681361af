/// Name of the environment variable containing the path to the reachability configuration file.
/// If not set, defaults to
///  (1) on Linux and macOS: `$XDG_CONFIG_HOME/hyreach/reach.toml` or `$HOME/.config/hyreach/reach.toml`
///  (2) on Windows: `%APPDATA%\hyreach\reach.toml`
pub const ENV_REACH_CONFIG_PATH: &str = "HYREACH_CONFIG_PATH";

/// Points sampled per fitted star.
pub const DEFAULT_SAMPLE_COUNT: usize = 100;

/// Consecutive misses tolerated by rejection sampling, as a fraction of the requested count.
pub const DEFAULT_MISS_TOLERANCE: f64 = 0.2;

/// Decimals kept when rounding a star before sampling it.
pub const DEFAULT_SAMPLING_DECIMALS: u32 = 6;

/// Absolute tolerance (scaled by the magnitude of the time) when aligning trajectory time stamps.
pub const TIME_ALIGNMENT_TOLERANCE: f64 = 1e-9;

pub const DEFAULT_HIDDEN_WIDTH: usize = 64;
pub const DEFAULT_EPOCHS: usize = 30;
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Size of the initial-state pool relative to one training batch.
pub const DEFAULT_POOL_FACTOR: usize = 10;
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
pub const DEFAULT_WEIGHT_DECAY: f64 = 1e-5;
/// Multiplicative learning rate decay applied after every epoch.
pub const DEFAULT_LR_DECAY: f64 = 0.95;
/// Weight of the constraint-violation term against `log1p(mu)`.
pub const DEFAULT_VIOLATION_WEIGHT: f64 = 7.0;
pub const DEFAULT_EVAL_SAMPLES: usize = 1000;
pub const LEAKY_RELU_SLOPE: f64 = 0.01;

pub const ADAM_BETA1: f64 = 0.9;
pub const ADAM_BETA2: f64 = 0.999;
pub const ADAM_EPSILON: f64 = 1e-8;

pub const DEFAULT_GRADIENT_ITERATIONS: usize = 100;
pub const DEFAULT_GRADIENT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_GRADIENT_INITIAL_MU: f64 = 1.0;

/// Relative margin added around simulated corners by the corner bloater.
pub const DEFAULT_BLOAT_MARGIN: f64 = 0.05;

/// Above this dimension the corner bloater simulates face centers instead of all `2ⁿ` corners.
pub const MAX_CORNER_DIMENSION: usize = 10;
