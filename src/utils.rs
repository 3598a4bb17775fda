//! Utility functions.

use crate::consts::{RATE_MAX, RATE_MIN};

use rand::prelude::*;

/// Produces a vector of `n` distribution rates, uniformly drawn in `[RATE_MIN, RATE_MAX)`.
pub fn rand_rates(n: usize, seed: Option<u64>) -> Vec<f64> {
    let seed = seed.unwrap_or(0);
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let between = rand::distributions::Uniform::new(RATE_MIN, RATE_MAX);
    (0..n).map(|_| between.sample(&mut rng)).collect()
}

/// Produces a vector of `n` uniform variates in the open interval `(0, 1)`.
///
/// Zero is excluded so that the inverse-CDF of any distribution stays finite.
pub fn rand_variates(n: usize, seed: Option<u64>) -> Vec<f64> {
    let seed = seed.unwrap_or(0);
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let between = rand::distributions::Uniform::new(f64::EPSILON, 1.0);
    (0..n).map(|_| between.sample(&mut rng)).collect()
}

/// Rounds `n` up to the nearest multiple of `multiple`.
pub fn round_up(n: usize, multiple: usize) -> usize {
    n.div_ceil(multiple) * multiple
}
