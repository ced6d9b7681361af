/// Absolute tolerance used by the simplex pivoting rules.
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-9;

/// Absolute tolerance on the phase-one objective before declaring a program infeasible.
///
/// Rows are normalized to unit coefficient magnitude first, so this is a distance in
/// the units of the variables.
pub const DEFAULT_FEASIBILITY_TOLERANCE: f64 = 1e-7;

/// Round-off allowed on the phase-one objective per unit of the largest right-hand side.
pub const RHS_ROUNDOFF: f64 = 1e-12;

/// Default number of simplex pivots before a solve gives up.
pub const DEFAULT_MAX_ITERATIONS: usize = 50_000;

/// Number of directions sampled on the unit circle by [`crate::star::StarSet::get_verts`].
pub const VERTEX_DIRECTION_SAMPLES: usize = 100;

/// Ridge added to a square basis before inversion when the inverse is only used for scoring.
pub const BASIS_RIDGE: f64 = 1e-6;

/// Smallest absolute determinant for which a square basis is treated as invertible.
pub const MIN_BASIS_DETERMINANT: f64 = 1e-12;
