//! Crate-level constants.

/// Default number of timed trials performed per execution strategy.
pub const TRIALS_PER_STRATEGY: u16 = 11;

/// Work-group size used by the strategies that need an explicit local size.
pub const WORK_GROUP_SIZE: usize = 64;

/// Lower bound (inclusive) of randomly generated distribution rates.
pub const RATE_MIN: f64 = 0.1;

/// Upper bound (exclusive) of randomly generated distribution rates.
pub const RATE_MAX: f64 = 10.0;

/// Seed used for the per-work-item uniform streams when none is given.
pub const DEFAULT_SEED: u64 = 0x5EED_CAFE;

/// Elapsed time carried by a failed trial.
pub const INVALID_ELAPSED: i64 = -1;

/// Multiplier used to decorrelate the seeds of consecutive work-items.
// NOTE: must match `STREAM_STRIDE` in `kernels/opencl/exponential.cl`.
pub const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
